//! Field catalog and per-field source priority.
//!
//! Every attribute a merged record can carry is declared once in [`FIELDS`].
//! The [`FieldPolicy`] maps each field, per entity kind, to the ordered list of
//! providers allowed to fill it.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tapedeck_common::EntityKind;

use super::provider::ProviderId;

/// Which entity kinds a field may appear on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applicability {
    MovieOnly,
    TvOnly,
    Common,
}

/// Granularity of a field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldScope {
    /// One value per lookup group, copied onto every member at commit.
    Group,
    /// One value per content unit.
    Unit,
}

/// Selects which priority table governs a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldClass {
    General,
    Description,
    Identifier,
}

/// Minimal shape a value must have to be merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldShape {
    Text,
    Url,
    ImdbId,
    NumericId,
}

impl FieldShape {
    /// Returns the trimmed value when it satisfies the shape.
    pub fn validate<'a>(&self, raw: &'a str) -> Option<&'a str> {
        let value = raw.trim();
        if value.is_empty() {
            return None;
        }
        let ok = match self {
            Self::Text => true,
            Self::Url => {
                let rest = value
                    .strip_prefix("https://")
                    .or_else(|| value.strip_prefix("http://"));
                matches!(rest, Some(host) if !host.is_empty() && !value.contains(char::is_whitespace))
            }
            Self::ImdbId => value
                .strip_prefix("tt")
                .is_some_and(|digits| digits.len() >= 7 && digits.bytes().all(|b| b.is_ascii_digit())),
            Self::NumericId => value.bytes().all(|b| b.is_ascii_digit()),
        };
        ok.then_some(value)
    }
}

/// Static description of one mergeable attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub applicability: Applicability,
    pub scope: FieldScope,
    pub class: FieldClass,
    pub shape: FieldShape,
}

impl FieldSpec {
    const fn new(
        name: &'static str,
        applicability: Applicability,
        scope: FieldScope,
        class: FieldClass,
        shape: FieldShape,
    ) -> Self {
        Self {
            name,
            applicability,
            scope,
            class,
            shape,
        }
    }

    pub fn applies_to(&self, kind: EntityKind) -> bool {
        match self.applicability {
            Applicability::Common => true,
            Applicability::MovieOnly => kind == EntityKind::Movie,
            Applicability::TvOnly => kind == EntityKind::Tv,
        }
    }
}

use Applicability::{Common, MovieOnly, TvOnly};
use FieldClass::{Description, General, Identifier};
use FieldScope::{Group, Unit};
use FieldShape::{ImdbId, NumericId, Text, Url};

/// The complete field catalog.
pub const FIELDS: &[FieldSpec] = &[
    FieldSpec::new("dmovie", MovieOnly, Unit, Description, Text),
    FieldSpec::new("release", MovieOnly, Group, General, Text),
    FieldSpec::new("studio", MovieOnly, Group, General, Text),
    FieldSpec::new("imovie", MovieOnly, Group, General, Url),
    FieldSpec::new("dseries", TvOnly, Group, Description, Text),
    FieldSpec::new("dseason", TvOnly, Group, Description, Text),
    FieldSpec::new("depisode", TvOnly, Unit, Description, Text),
    FieldSpec::new("airdate", TvOnly, Unit, General, Text),
    FieldSpec::new("network", TvOnly, Group, General, Text),
    FieldSpec::new("iseries", TvOnly, Group, General, Url),
    FieldSpec::new("iepisode", TvOnly, Unit, General, Url),
    FieldSpec::new("genre", Common, Group, General, Text),
    FieldSpec::new("rating", Common, Group, General, Text),
    FieldSpec::new("cast", Common, Group, General, Text),
    FieldSpec::new("imdb", Common, Group, Identifier, ImdbId),
    FieldSpec::new("tmdb", Common, Group, Identifier, NumericId),
    FieldSpec::new("tvdb", TvOnly, Group, Identifier, NumericId),
    FieldSpec::new("tvmaze", TvOnly, Group, Identifier, NumericId),
];

/// Look up a field by name.
pub fn field(name: &str) -> Option<&'static FieldSpec> {
    FIELDS.iter().find(|f| f.name == name)
}

/// Fields carried by records of `kind` at `scope`.
pub fn fields_for(kind: EntityKind, scope: FieldScope) -> impl Iterator<Item = &'static FieldSpec> {
    FIELDS
        .iter()
        .filter(move |f| f.scope == scope && f.applies_to(kind))
}

// ---------------------------------------------------------------------------
// Priority configuration
// ---------------------------------------------------------------------------

/// Provider order for general and description fields, per entity kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralPriority {
    pub movie: Vec<ProviderId>,
    pub tv: Vec<ProviderId>,
}

impl Default for GeneralPriority {
    fn default() -> Self {
        use ProviderId::*;
        Self {
            movie: vec![Scrape, Probe, Tmdb, Omdb],
            tv: vec![Scrape, Tvdb, Tvmaze, Omdb, Tmdb],
        }
    }
}

/// Provider order for identifier fields, shared by both kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentifierPriority {
    pub order: Vec<ProviderId>,
}

impl Default for IdentifierPriority {
    fn default() -> Self {
        use ProviderId::*;
        Self {
            order: vec![Tvdb, Omdb, Tvmaze, Tmdb],
        }
    }
}

/// Errors raised while building a [`FieldPolicy`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("priority override names unknown field '{0}'")]
    UnknownField(String),

    #[error("provider '{provider}' listed twice in {table}")]
    DuplicateProvider { table: String, provider: ProviderId },
}

fn check_unique(table: &str, order: &[ProviderId]) -> Result<(), PolicyError> {
    let mut seen = HashSet::new();
    for provider in order {
        if !seen.insert(*provider) {
            return Err(PolicyError::DuplicateProvider {
                table: table.to_string(),
                provider: *provider,
            });
        }
    }
    Ok(())
}

/// Effective provider order for every `(kind, field)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPolicy {
    orders: BTreeMap<(EntityKind, &'static str), Vec<ProviderId>>,
}

impl FieldPolicy {
    /// Build the policy from the named priority tables plus per-field overrides.
    ///
    /// TV description fields take the TV general order with the probe moved
    /// directly behind the scrape. Overrides replace the order for every kind
    /// the field applies to.
    pub fn new(
        general: &GeneralPriority,
        identifiers: &IdentifierPriority,
        overrides: &BTreeMap<String, Vec<ProviderId>>,
    ) -> Result<Self, PolicyError> {
        check_unique("priority.general.movie", &general.movie)?;
        check_unique("priority.general.tv", &general.tv)?;
        check_unique("priority.identifiers.order", &identifiers.order)?;
        for (name, order) in overrides {
            if field(name).is_none() {
                return Err(PolicyError::UnknownField(name.clone()));
            }
            check_unique(&format!("priority.fields.{name}"), order)?;
        }

        Ok(Self::build(general, identifiers, overrides))
    }

    fn build(
        general: &GeneralPriority,
        identifiers: &IdentifierPriority,
        overrides: &BTreeMap<String, Vec<ProviderId>>,
    ) -> Self {
        let tv_description = with_probe_after_scrape(&general.tv);

        let mut orders = BTreeMap::new();
        for spec in FIELDS {
            for kind in [EntityKind::Movie, EntityKind::Tv] {
                if !spec.applies_to(kind) {
                    continue;
                }
                let order = if let Some(custom) = overrides.get(spec.name) {
                    custom.clone()
                } else {
                    match (spec.class, kind) {
                        (FieldClass::Identifier, _) => identifiers.order.clone(),
                        (FieldClass::Description, EntityKind::Tv) => tv_description.clone(),
                        (_, EntityKind::Tv) => general.tv.clone(),
                        (_, EntityKind::Movie) => general.movie.clone(),
                    }
                };
                orders.insert((kind, spec.name), order);
            }
        }

        Self { orders }
    }

    /// Ordered providers for a field, empty when the field does not apply.
    pub fn order<'a>(&'a self, kind: EntityKind, field: &'a str) -> &'a [ProviderId] {
        // Shorten the key lifetime so a borrowed name can be looked up directly.
        let orders: &BTreeMap<(EntityKind, &str), Vec<ProviderId>> = &self.orders;
        orders
            .get(&(kind, field))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Position of `provider` in the field's order; lower is stronger.
    pub fn rank(&self, kind: EntityKind, field: &str, provider: ProviderId) -> Option<usize> {
        self.order(kind, field).iter().position(|p| *p == provider)
    }

    /// Every provider named anywhere in the policy.
    pub fn providers(&self) -> impl Iterator<Item = ProviderId> + '_ {
        let mut all: Vec<ProviderId> = self.orders.values().flatten().copied().collect();
        all.sort();
        all.dedup();
        all.into_iter()
    }

    /// All `(kind, field, order)` entries, movie fields first, catalog order within a kind.
    pub fn entries(&self) -> Vec<(EntityKind, &'static FieldSpec, &[ProviderId])> {
        let mut out = Vec::new();
        for kind in [EntityKind::Movie, EntityKind::Tv] {
            for spec in FIELDS.iter().filter(|f| f.applies_to(kind)) {
                out.push((kind, spec, self.order(kind, spec.name)));
            }
        }
        out
    }
}

impl Default for FieldPolicy {
    fn default() -> Self {
        Self::build(
            &GeneralPriority::default(),
            &IdentifierPriority::default(),
            &BTreeMap::new(),
        )
    }
}

fn with_probe_after_scrape(order: &[ProviderId]) -> Vec<ProviderId> {
    let mut out: Vec<ProviderId> = order
        .iter()
        .copied()
        .filter(|p| *p != ProviderId::Probe)
        .collect();
    let at = out
        .iter()
        .position(|p| *p == ProviderId::Scrape)
        .map(|i| i + 1)
        .unwrap_or(0);
    out.insert(at, ProviderId::Probe);
    out
}
