//! Communication channels (Telegram).
//!
//! The channel handle trait is what the relay talks to: send a reply, fetch an attachment.
//! Inbound updates are turned into [`InboundEvent`]s and handed to the relay.

mod handle;
mod inbound;
mod telegram;

pub use handle::{ChannelHandle, RemoteFile};
pub use inbound::{ContentKind, InboundEvent};
pub use telegram::{telegram_api_base, TelegramChannel, TelegramError, TelegramUpdate};
