//! View state for the chat client, kept free of any UI toolkit so it can be driven
//! and tested on its own.

pub mod chat_list;
pub mod composer;
pub mod credentials;
pub mod feed;
pub mod gate;
pub mod scroll;

pub use chat_list::{ChatListState, ChatListView, chat_label};
pub use composer::{Composer, Outgoing, SendReceipt};
pub use credentials::{CredentialForm, FormMode, SubmitRequest};
pub use feed::{
    FeedAttachment, FeedChange, FeedSession, FeedTarget, FeedUpdate, FeedView, MessageFeed,
};
pub use gate::GateOutcome;
pub use scroll::{ScrollAffordance, ScrollFollow, ScrollGeometry, ScrollTolerance};
