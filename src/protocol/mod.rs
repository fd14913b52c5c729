//! Wire protocol: message catalog, signature envelope and framing

pub mod codec;
pub mod envelope;
pub mod messages;

pub use codec::{decode_frame, encode_frame, CodecError, FrameCodec};
pub use envelope::Envelope;
pub use messages::{Blob, LayerEntry, Message, ParticipantId, Payload, PlayerInfo, Role, Stage};
