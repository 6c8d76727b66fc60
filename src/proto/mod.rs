// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Wire protocol spoken with remote and child-process stages.
//!
//! * `frame` - ordered key/value document model
//! * `codec` - XTalk binary framing as a `tokio_util` codec
//! * `commands` - command names and well-known keys

pub mod codec;
pub mod commands;
pub mod frame;

pub use codec::{CodecError, XTalkCodec};
pub use frame::{Frame, FrameValue, PCDATA_KEY};
