use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// Login identifier (EMIS code) and password, supplied once per run.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credential {
    pub identifier: String,
    #[serde(default)]
    pub secret: String,
}

impl Credential {
    pub fn new(identifier: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("identifier", &self.identifier)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// A facility (school) to query, keyed by its EMIS code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetEntity {
    pub id: String,
    pub name: String,
}

impl TargetEntity {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

impl Display for TargetEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.id, self.name)
    }
}

/// Jurisdiction identifiers that scope every detail-report query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterContext {
    pub district: String,
    pub tehsil: String,
    pub markaz: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Commodity {
    Milk,
    Biscuit,
}

impl Commodity {
    pub const ALL: [Commodity; 2] = [Commodity::Milk, Commodity::Biscuit];

    /// Heading text of this commodity's block in the detail-report fragment.
    pub fn section_title(&self) -> &'static str {
        match self {
            Commodity::Milk => "Summary Date Wise (Milk)",
            Commodity::Biscuit => "Summary Date Wise (Biscuit)",
        }
    }
}

impl Display for Commodity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Commodity::Milk => write!(f, "Milk"),
            Commodity::Biscuit => write!(f, "Biscuit"),
        }
    }
}

/// One row of a commodity table. Every field is the trimmed cell text as the
/// portal rendered it, separators and leading zeros included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    pub serial: String,
    pub date: String,
    pub received_quantity: String,
    pub present_stock: String,
    pub consumption: String,
    pub remaining_balance: String,
}

impl Display for ExtractionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  Sr:                {}", self.serial)?;
        writeln!(f, "  Date:              {}", self.date)?;
        writeln!(f, "  Received Quantity: {}", self.received_quantity)?;
        writeln!(f, "  Present Stock:     {}", self.present_stock)?;
        writeln!(f, "  Consumption:       {}", self.consumption)?;
        write!(f, "  Remaining Balance: {}", self.remaining_balance)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum EntityStatus {
    /// The filtered query returned a fragment; sections may still be absent.
    Extracted,
    /// The detail page carried neither a meta nor a hidden-input token.
    TokenUnavailable,
    RequestFailed { reason: String },
    /// The run was cancelled before this entity finished.
    NotAttempted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityResult {
    pub entity: TargetEntity,
    pub milk: Option<ExtractionRecord>,
    pub biscuit: Option<ExtractionRecord>,
    pub status: EntityStatus,
}

impl EntityResult {
    pub fn extracted(
        entity: TargetEntity,
        milk: Option<ExtractionRecord>,
        biscuit: Option<ExtractionRecord>,
    ) -> Self {
        Self {
            entity,
            milk,
            biscuit,
            status: EntityStatus::Extracted,
        }
    }

    pub fn empty(entity: TargetEntity, status: EntityStatus) -> Self {
        Self {
            entity,
            milk: None,
            biscuit: None,
            status,
        }
    }

    pub fn record(&self, commodity: Commodity) -> Option<&ExtractionRecord> {
        match commodity {
            Commodity::Milk => self.milk.as_ref(),
            Commodity::Biscuit => self.biscuit.as_ref(),
        }
    }

    pub fn has_data(&self) -> bool {
        self.milk.is_some() || self.biscuit.is_some()
    }
}

impl Display for EntityResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.entity)?;
        for commodity in Commodity::ALL {
            match self.record(commodity) {
                Some(record) => writeln!(f, "{} Data (Latest):\n{}", commodity, record)?,
                None => writeln!(f, "{} Data: N/A", commodity)?,
            }
        }
        Ok(())
    }
}

/// One result per requested entity, in request order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub entities: Vec<EntityResult>,
}

impl BatchResult {
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityResult> {
        self.entities.iter()
    }
}

impl From<Vec<EntityResult>> for BatchResult {
    fn from(entities: Vec<EntityResult>) -> Self {
        Self { entities }
    }
}
