//! Gemeinsame Identifikationstypen fuer Huddle
//!
//! Alle IDs verwenden das Newtype-Pattern um Verwechslungen zwischen
//! verschiedenen ID-Arten zur Compilezeit auszuschliessen.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Eindeutige Benutzer-ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl UserId {
    /// Erstellt eine neue zufaellige UserId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "user:{}", self.0)
    }
}

/// Eindeutige Geraete-ID
///
/// Jedes Geraet eines Benutzers hat ein eigenes Identitaets-Schluesselpaar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(pub Uuid);

impl DeviceId {
    /// Erstellt eine neue zufaellige DeviceId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for DeviceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "device:{}", self.0)
    }
}

/// Eindeutige Kanal-ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub Uuid);

impl ChannelId {
    /// Erstellt eine neue zufaellige ChannelId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Gibt die innere UUID zurueck
    pub fn inner(&self) -> Uuid {
        self.0
    }
}

impl Default for ChannelId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "channel:{}", self.0)
    }
}

/// Eine Konversation, fuer die genau ein symmetrischer Schluessel existiert
///
/// Entweder ein Kanal oder ein Direktnachrichten-Paar. Das Paar wird beim
/// Erstellen normalisiert (kleinere UUID zuerst), damit beide Teilnehmer
/// dieselbe Entity adressieren.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum EntityId {
    Kanal(ChannelId),
    Direkt(UserId, UserId),
}

impl EntityId {
    /// Entity fuer einen Kanal
    pub fn kanal(id: ChannelId) -> Self {
        Self::Kanal(id)
    }

    /// Entity fuer eine Direktnachrichten-Konversation zweier Benutzer
    pub fn direkt(a: UserId, b: UserId) -> Self {
        if a <= b {
            Self::Direkt(a, b)
        } else {
            Self::Direkt(b, a)
        }
    }

    /// Stabile Speicherform (`channel:<uuid>` bzw. `dm:<uuid>:<uuid>`)
    pub fn speicher_id(&self) -> String {
        self.to_string()
    }

    /// Gibt `true` zurueck wenn der Benutzer Teil des DM-Paars ist
    pub fn ist_dm_teilnehmer(&self, user: UserId) -> bool {
        match self {
            Self::Kanal(_) => false,
            Self::Direkt(a, b) => *a == user || *b == user,
        }
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Kanal(id) => write!(f, "channel:{}", id.0),
            Self::Direkt(a, b) => write!(f, "dm:{}:{}", a.0, b.0),
        }
    }
}

/// Fehler beim Parsen einer Entity-ID aus ihrer Speicherform
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Ungueltige Entity-ID: {0}")]
pub struct EntityIdParseError(pub String);

impl FromStr for EntityId {
    type Err = EntityIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = |teil: &str| {
            Uuid::parse_str(teil).map_err(|_| EntityIdParseError(s.to_string()))
        };

        if let Some(rest) = s.strip_prefix("channel:") {
            return Ok(Self::Kanal(ChannelId(uuid(rest)?)));
        }

        if let Some(rest) = s.strip_prefix("dm:") {
            let (a, b) = rest
                .split_once(':')
                .ok_or_else(|| EntityIdParseError(s.to_string()))?;
            return Ok(Self::direkt(UserId(uuid(a)?), UserId(uuid(b)?)));
        }

        Err(EntityIdParseError(s.to_string()))
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for EntityId {
    type Error = EntityIdParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}
