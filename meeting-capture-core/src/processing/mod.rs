pub mod asr_downsampler;
pub mod frame_pacer;
pub mod ring_buffer;
pub mod source_resampler;
pub mod stereo_mixer;
pub mod wav_format;
