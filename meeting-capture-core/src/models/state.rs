/// Capture thread lifecycle.
///
/// State transitions:
/// ```text
/// idle → initializing → capturing → cleaning-up → idle
///             ↓
///            idle            (initialization failed)
///
/// any state → shutting-down  (terminal, thread exits)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureState {
    Idle,
    Initializing,
    Capturing,
    CleaningUp,
    ShuttingDown,
}

impl CaptureState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_capturing(&self) -> bool {
        matches!(self, Self::Capturing)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ShuttingDown)
    }
}

/// Writer thread lifecycle.
///
/// ```text
/// idle → writing → finalizing → idle
/// any state → shutting-down
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriterState {
    Idle,
    Writing,
    Finalizing,
    ShuttingDown,
}

impl WriterState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_writing(&self) -> bool {
        matches!(self, Self::Writing)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ShuttingDown)
    }
}
