#![doc = include_str!("../Readme.md")]

mod codec;
mod headers;
mod ids;
mod milter;
mod server;
mod session;

#[cfg(feature = "_fuzzing")]
pub mod fuzzing;

pub use headers::HeaderMap;
pub use milter::{Error, Milter};
pub use server::{Listener, Server, ServerHandle};
pub use session::handle_connection;

pub(crate) use self::codec::MilterCodec;
