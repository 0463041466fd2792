pub use body::{body_formats, BodyFormat, BodyRepresentation};
pub use event::{EventData, EventMessage, CONTENT_ENCODING};

mod body;
mod event;
