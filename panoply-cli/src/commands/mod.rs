pub mod inspect;
pub mod send;

pub use inspect::{cmd_fields, cmd_record, cmd_resources};
pub use send::{cmd_endpoint, cmd_send, ConnectionArgs, SendArgs};
