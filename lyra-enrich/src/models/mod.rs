//! Data models for lyra-enrich

pub mod job;
pub mod lyrics;
pub mod song;

pub use job::{JobKind, JobStatus, ProcessingJob};
pub use lyrics::{lines_from_timed, LyricLine, Lyrics, TimedText};
pub use song::{NewSong, Song};
