//! Contract ABI model and loader.
//!
//! The payment program publishes a Sierra-style JSON ABI. Only the parts the
//! keeper reads are modelled: functions (including those nested in
//! interfaces), structs, enums and events. Everything else is accepted and
//! ignored.

pub mod value;

use serde::Deserialize;
use starknet::core::types::Felt;
use std::collections::HashMap;
use std::path::Path;

use crate::utils::error::{KeeperError, Result};

pub use value::{AbiValue, FeltReader};

/// ABI of the payment program shipped with the crate.
pub const BUNDLED_ABI: &str = include_str!("../../abi/starkloop.json");

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AbiEntry {
    Function(AbiFunction),
    L1Handler(AbiFunction),
    Constructor(AbiConstructor),
    Interface(AbiInterface),
    Impl(AbiImpl),
    Struct(AbiStruct),
    Enum(AbiEnum),
    Event(AbiEvent),
}

#[derive(Debug, Clone, Deserialize)]
pub struct AbiFunction {
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<AbiParam>,
    #[serde(default)]
    pub outputs: Vec<AbiOutput>,
    #[serde(default)]
    pub state_mutability: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AbiConstructor {
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<AbiParam>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AbiInterface {
    pub name: String,
    #[serde(default)]
    pub items: Vec<AbiEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AbiImpl {
    pub name: String,
    pub interface_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AbiParam {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AbiOutput {
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AbiStruct {
    pub name: String,
    #[serde(default)]
    pub members: Vec<AbiParam>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AbiEnum {
    pub name: String,
    #[serde(default)]
    pub variants: Vec<AbiParam>,
}

/// Where an event member is serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventMemberKind {
    Key,
    Data,
    Nested,
    Flat,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AbiEventMember {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    pub kind: EventMemberKind,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AbiEvent {
    Struct {
        name: String,
        #[serde(default)]
        members: Vec<AbiEventMember>,
    },
    Enum {
        name: String,
        #[serde(default)]
        variants: Vec<AbiEventMember>,
    },
}

impl AbiEvent {
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            AbiEvent::Struct { name, .. } | AbiEvent::Enum { name, .. } => name,
        }
    }
}

/// Last `::`-separated segment of a fully-qualified Cairo path.
#[must_use]
pub fn short_name(path: &str) -> &str {
    path.rsplit("::").next().unwrap_or(path)
}

/// Indexed view of a contract ABI.
#[derive(Debug, Clone, Default)]
pub struct ContractAbi {
    functions: HashMap<String, AbiFunction>,
    structs: HashMap<String, AbiStruct>,
    enums: HashMap<String, AbiEnum>,
    events: Vec<AbiEvent>,
}

impl ContractAbi {
    /// Parses a JSON ABI document.
    ///
    /// # Errors
    ///
    /// Returns `KeeperError::AbiError` if the document is not a valid ABI.
    pub fn from_json(json: &str) -> Result<Self> {
        let entries: Vec<AbiEntry> = serde_json::from_str(json)
            .map_err(|e| KeeperError::AbiError(format!("Invalid ABI document: {e}")))?;
        Ok(Self::from_entries(entries))
    }

    /// The ABI bundled with the crate.
    ///
    /// # Errors
    ///
    /// Returns `KeeperError::AbiError` if the bundled document does not parse.
    pub fn bundled() -> Result<Self> {
        Self::from_json(BUNDLED_ABI)
    }

    /// Reads the ABI at `path`, or falls back to the bundled one.
    ///
    /// # Errors
    ///
    /// Returns `KeeperError::Io` if the file cannot be read and
    /// `KeeperError::AbiError` if it does not parse.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                tracing::debug!(path = %path.display(), "Loading contract ABI");
                let json = std::fs::read_to_string(path)?;
                Self::from_json(&json)
            }
            None => Self::bundled(),
        }
    }

    fn from_entries(entries: Vec<AbiEntry>) -> Self {
        let mut abi = Self::default();
        for entry in entries {
            abi.insert(entry);
        }
        abi
    }

    fn insert(&mut self, entry: AbiEntry) {
        match entry {
            AbiEntry::Function(f) | AbiEntry::L1Handler(f) => {
                self.functions.insert(f.name.clone(), f);
            }
            AbiEntry::Interface(interface) => {
                for item in interface.items {
                    self.insert(item);
                }
            }
            AbiEntry::Struct(s) => {
                self.structs.insert(s.name.clone(), s);
            }
            AbiEntry::Enum(e) => {
                self.enums.insert(e.name.clone(), e);
            }
            AbiEntry::Event(e) => self.events.push(e),
            AbiEntry::Constructor(_) | AbiEntry::Impl(_) => {}
        }
    }

    #[must_use]
    pub fn function(&self, name: &str) -> Option<&AbiFunction> {
        self.functions.get(name)
    }

    #[must_use]
    pub fn struct_def(&self, name: &str) -> Option<&AbiStruct> {
        self.structs.get(name)
    }

    #[must_use]
    pub fn enum_def(&self, name: &str) -> Option<&AbiEnum> {
        self.enums.get(name)
    }

    /// Finds an event by its short name (`DuePayment`) or full path.
    #[must_use]
    pub fn event(&self, name: &str) -> Option<&AbiEvent> {
        self.events
            .iter()
            .find(|e| e.name() == name)
            .or_else(|| self.events.iter().find(|e| short_name(e.name()) == name))
    }

    /// Finds an event that must be a `kind: "struct"` event and returns its members.
    ///
    /// # Errors
    ///
    /// Returns `KeeperError::AbiError` if the event is absent or is an enum event.
    pub fn struct_event(&self, name: &str) -> Result<(&str, &[AbiEventMember])> {
        match self.event(name) {
            Some(AbiEvent::Struct { name, members }) => Ok((name.as_str(), members.as_slice())),
            Some(AbiEvent::Enum { name, .. }) => Err(KeeperError::AbiError(format!(
                "Event '{name}' is an enum event, expected a struct event"
            ))),
            None => Err(KeeperError::AbiError(format!("Event '{name}' not found in ABI"))),
        }
    }

    /// Decodes one value of type `ty` from `reader`.
    ///
    /// # Errors
    ///
    /// Returns `KeeperError::DecodingError` on short input, out-of-range
    /// values or unknown enum variants, and `KeeperError::AbiError` for types
    /// the ABI does not define.
    pub fn decode(&self, ty: &str, reader: &mut FeltReader<'_>) -> Result<AbiValue> {
        value::decode(self, ty, reader)
    }

    /// Decodes a function's return data.
    ///
    /// # Errors
    ///
    /// Returns `KeeperError::AbiError` if the function is unknown and
    /// `KeeperError::DecodingError` if `felts` does not match its outputs exactly.
    pub fn decode_outputs(&self, function: &str, felts: &[Felt]) -> Result<Vec<AbiValue>> {
        let f = self.function(function).ok_or_else(|| {
            KeeperError::AbiError(format!("Function '{function}' not found in ABI"))
        })?;

        let mut reader = FeltReader::new(felts);
        let values = f
            .outputs
            .iter()
            .map(|out| self.decode(&out.ty, &mut reader))
            .collect::<Result<Vec<_>>>()?;
        reader.finish()?;
        Ok(values)
    }
}
