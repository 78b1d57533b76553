pub mod retry;
pub mod time;
pub mod video_url;
