//! Message catalog shared by the Playing Area, the Caller and the Players

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::PokerResult;
use crate::security::{PublicKey, SymmetricKey};

/// Identifier of a participant: 0 is the Caller, 1..N are Players.
///
/// Serialised as a JSON number, and as a string when used as a map key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ParticipantId(u32);

impl ParticipantId {
    pub const CALLER: ParticipantId = ParticipantId(0);

    pub fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    pub fn is_caller(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for ParticipantId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(self.0)
    }
}

struct ParticipantIdVisitor;

impl<'de> Visitor<'de> for ParticipantIdVisitor {
    type Value = ParticipantId;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a participant id as a number or a numeric string")
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Self::Value, E> {
        u32::try_from(value)
            .map(ParticipantId)
            .map_err(|_| E::custom(format!("participant id {} out of range", value)))
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Self::Value, E> {
        u32::try_from(value)
            .map(ParticipantId)
            .map_err(|_| E::custom(format!("participant id {} out of range", value)))
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Self::Value, E> {
        value
            .parse::<u32>()
            .map(ParticipantId)
            .map_err(|_| E::custom(format!("invalid participant id '{}'", value)))
    }
}

impl<'de> Deserialize<'de> for ParticipantId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ParticipantIdVisitor)
    }
}

/// Role declared at registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Caller,
    Player,
}

/// Verification round a `CheatVerify` belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Cards,
    Deck,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Cards => f.write_str("Cards"),
            Stage::Deck => f.write_str("Deck"),
        }
    }
}

/// Opaque byte string, hex encoded on the wire. Deck elements in transit are blobs.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Blob(#[serde(with = "hex::serde")] Vec<u8>);

impl Blob {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = &self.0[..self.0.len().min(8)];
        write!(f, "Blob({}..; {} bytes)", hex::encode(shown), self.0.len())
    }
}

impl From<Vec<u8>> for Blob {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// One onion layer handed out for independent decryption: the deck as it left
/// its owner, and the key the owner encrypted it with (absent when the owner
/// was disqualified before revealing it).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerEntry {
    pub deck: Vec<Blob>,
    pub sym_key: Option<SymmetricKey>,
}

/// Public information the Playing Area reports about a registered player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub nick: String,
    pub public_key: PublicKey,
    pub disqualified: bool,
    pub committed_card: Option<Vec<u64>>,
}

/// The closed set of protocol messages, discriminated by `command` on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all_fields = "camelCase")]
pub enum Payload {
    // Registration
    Register {
        role: Role,
        nick: String,
        public_key: PublicKey,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        num_players: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        assigned_id: Option<ParticipantId>,
    },
    #[serde(rename = "Register_ACK")]
    RegisterAck {
        id: ParticipantId,
        server_public_key: PublicKey,
    },
    #[serde(rename = "Register_NACK")]
    RegisterNack {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    // Setup
    #[serde(rename = "Begin_Game")]
    BeginGame {
        public_keys: BTreeMap<ParticipantId, PublicKey>,
    },

    // Shuffle
    #[serde(rename = "Message_Deck")]
    DeckMessage { deck: Vec<Blob> },
    #[serde(rename = "Commit_Card")]
    CommitCard { deck: Vec<Blob>, card: Vec<u64> },
    Cheat { cheater_id: ParticipantId },

    // Card validation
    #[serde(rename = "Sign_Final_Deck_ACK")]
    SignFinalDeckAck {
        playing_cards: BTreeMap<ParticipantId, Vec<u64>>,
    },
    #[serde(rename = "Verify_Cards")]
    VerifyCards {
        playing_cards: BTreeMap<ParticipantId, Vec<u64>>,
    },
    #[serde(rename = "Verify_Card_OK")]
    VerifyCardOk,
    #[serde(rename = "Verify_Card_NOK")]
    VerifyCardNok { invalid_ids: Vec<ParticipantId> },
    #[serde(rename = "Cheat_Verify")]
    CheatVerify {
        results: BTreeMap<ParticipantId, bool>,
        stage: Stage,
    },
    #[serde(rename = "Cards_Validated")]
    CardsValidated,

    // Deck validation
    #[serde(rename = "Ask_Sym_Keys")]
    AskSymKeys,
    #[serde(rename = "Post_Sym_Keys")]
    PostSymKeys {
        sym_keys: BTreeMap<ParticipantId, SymmetricKey>,
    },
    #[serde(rename = "Post_Final_Decks")]
    PostFinalDecks {
        decks: BTreeMap<ParticipantId, LayerEntry>,
        signed_deck: Vec<Blob>,
    },
    #[serde(rename = "Verify_Deck_OK")]
    VerifyDeckOk,
    #[serde(rename = "Verify_Deck_NOK")]
    VerifyDeckNok { cheater_ids: Vec<ParticipantId> },

    // Endgame
    #[serde(rename = "Ask_For_Winner")]
    AskForWinner,
    Winner { winners: Vec<ParticipantId> },
    #[serde(rename = "Winner_ACK")]
    WinnerAck { winners: Vec<ParticipantId> },

    // Administration
    Disqualify { disqualified_id: ParticipantId },
    #[serde(rename = "Get_Players_List")]
    GetPlayersList,
    #[serde(rename = "Players_List")]
    PlayersList {
        players: BTreeMap<ParticipantId, PlayerInfo>,
    },
}

impl Payload {
    /// Wire discriminator of this payload
    pub fn command(&self) -> &'static str {
        match self {
            Payload::Register { .. } => "Register",
            Payload::RegisterAck { .. } => "Register_ACK",
            Payload::RegisterNack { .. } => "Register_NACK",
            Payload::BeginGame { .. } => "Begin_Game",
            Payload::DeckMessage { .. } => "Message_Deck",
            Payload::CommitCard { .. } => "Commit_Card",
            Payload::Cheat { .. } => "Cheat",
            Payload::SignFinalDeckAck { .. } => "Sign_Final_Deck_ACK",
            Payload::VerifyCards { .. } => "Verify_Cards",
            Payload::VerifyCardOk => "Verify_Card_OK",
            Payload::VerifyCardNok { .. } => "Verify_Card_NOK",
            Payload::CheatVerify { .. } => "Cheat_Verify",
            Payload::CardsValidated => "Cards_Validated",
            Payload::AskSymKeys => "Ask_Sym_Keys",
            Payload::PostSymKeys { .. } => "Post_Sym_Keys",
            Payload::PostFinalDecks { .. } => "Post_Final_Decks",
            Payload::VerifyDeckOk => "Verify_Deck_OK",
            Payload::VerifyDeckNok { .. } => "Verify_Deck_NOK",
            Payload::AskForWinner => "Ask_For_Winner",
            Payload::Winner { .. } => "Winner",
            Payload::WinnerAck { .. } => "Winner_ACK",
            Payload::Disqualify { .. } => "Disqualify",
            Payload::GetPlayersList => "Get_Players_List",
            Payload::PlayersList { .. } => "Players_List",
        }
    }
}

/// A payload plus the id of its originator (absent for the Playing Area)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "ID", default)]
    pub sender: Option<ParticipantId>,
    #[serde(flatten)]
    pub payload: Payload,
}

impl Message {
    /// Message originated by the Playing Area
    pub fn from_area(payload: Payload) -> Self {
        Self {
            sender: None,
            payload,
        }
    }

    /// Message originated by a Caller or Player
    pub fn from_participant(sender: ParticipantId, payload: Payload) -> Self {
        Self {
            sender: Some(sender),
            payload,
        }
    }

    pub fn command(&self) -> &'static str {
        self.payload.command()
    }

    /// Canonical serialisation that signatures are computed over.
    ///
    /// Field order is fixed by the type definitions and every map is ordered,
    /// so identical fields always produce identical bytes.
    pub fn canonical_bytes(&self) -> PokerResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}
