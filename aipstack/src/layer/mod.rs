//! The protocol layers.
//!
//! Only TCP is provided. Framing and routing below it are left to the embedding stack, which
//! parses segments with the [`wire`] module and feeds them to the connections of the [`tcp`]
//! layer.
//!
//! [`wire`]: ../wire/index.html
//! [`tcp`]: tcp/index.html
pub mod tcp;
