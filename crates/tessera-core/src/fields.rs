//! Field selectors for optional relationship-derived fields
//!
//! Reads populate only the fields a caller asks for. Selectors arrive as
//! comma-separated names at the boundary and are validated against the
//! entity kind here, so the catalog only ever sees a typed [`FieldSet`].

use crate::error::{Error, Result};
use crate::kind::{EntityKind, KindConfig};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Field {
    Owner,
    Followers,
    Tags,
    /// The kind's child list (`tasks`, `users`, `tables`, ...)
    Children,
    Owns,
    /// Teams a user belongs to
    Teams,
    /// Entities a user follows
    Follows,
}

impl Field {
    fn supported_by(&self, config: &KindConfig) -> bool {
        match self {
            Self::Owner => config.has_owner,
            Self::Followers => config.has_followers,
            Self::Tags => config.has_tags,
            Self::Children => config.children.is_some(),
            Self::Owns => config.has_owns,
            Self::Teams => config.has_teams,
            Self::Follows => config.has_follows,
        }
    }

    /// Name of the field as exposed for `kind`
    pub fn name(&self, kind: EntityKind) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Followers => "followers",
            Self::Tags => "tags",
            Self::Children => kind.config().child_field().unwrap_or("children"),
            Self::Owns => "owns",
            Self::Teams => "teams",
            Self::Follows => "follows",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSet(BTreeSet<Field>);

impl FieldSet {
    pub fn none() -> Self {
        Self::default()
    }

    /// Every optional field `kind` supports
    pub fn all_for(kind: EntityKind) -> Self {
        let config = kind.config();
        Self(
            [
                Field::Owner,
                Field::Followers,
                Field::Tags,
                Field::Children,
                Field::Owns,
                Field::Teams,
                Field::Follows,
            ]
            .into_iter()
            .filter(|f| f.supported_by(config))
            .collect(),
        )
    }

    /// Parse a comma-separated selector such as `owner,tasks,followers`
    pub fn parse(kind: EntityKind, spec: &str) -> Result<Self> {
        let config = kind.config();
        let mut fields = BTreeSet::new();
        for name in spec.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            let field = match name {
                "owner" => Field::Owner,
                "followers" => Field::Followers,
                "tags" => Field::Tags,
                "owns" => Field::Owns,
                "teams" => Field::Teams,
                "follows" => Field::Follows,
                other if config.child_field() == Some(other) => Field::Children,
                other => {
                    return Err(Error::Validation(format!(
                        "Invalid field name {} for {}",
                        other, kind
                    )))
                }
            };
            if !field.supported_by(config) {
                return Err(Error::Validation(format!(
                    "Invalid field name {} for {}",
                    name, kind
                )));
            }
            fields.insert(field);
        }
        Ok(Self(fields))
    }

    pub fn with(mut self, field: Field) -> Self {
        self.0.insert(field);
        self
    }

    pub fn contains(&self, field: Field) -> bool {
        self.0.contains(&field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Field> + '_ {
        self.0.iter().copied()
    }
}
