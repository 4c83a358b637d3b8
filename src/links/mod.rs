//! Short links: management, redirect resolution and click classification.

mod classify;
mod recorder;
mod service;

pub use classify::{ClientInfo, ClientMeta, Device};
pub use recorder::{ClickRecorder, PasswordChallenge, RedirectOutcome, RedirectScope};
pub use service::{
    CreateLink, LinkDetail, LinkError, LinkListing, LinkService, GENERATED_KEY_LEN,
    MAX_CUSTOM_KEY_LEN, RECENT_EVENT_LIMIT,
};
