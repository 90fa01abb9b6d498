pub mod fanout;
pub mod publisher;
