//! Message sequencing between the server and a client document

mod ordered_buffer;

pub use ordered_buffer::{BufferAdd, OrderedMessageBuffer};
