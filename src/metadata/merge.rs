//! Field-granular merge of provider records.
//!
//! [`MergeResolver::merge`] builds a fresh [`MergedRecord`] for one target
//! from the records every provider returned. [`MergeResolver::upgrade`]
//! combines a fresh record with the one already stored.
//!
//! # Determinism
//!
//! Records are indexed by provider before any decision is made, so the order
//! in which provider calls completed never shows up in the output. Inputs come
//! in layers: for a content unit the specific layer holds the episode and file
//! records, the general layer holds the records fetched for the whole group.
//! For each provider the specific layer is consulted first. When one provider
//! contributed several records to the same layer, the lexicographically
//! smallest valid value wins.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tapedeck_common::EntityKind;
use tracing::warn;

use super::fields::{fields_for, field, FieldPolicy, FieldScope, FieldSpec};
use super::provider::{ProviderId, ProviderRecord};

/// A merged value together with the provider that supplied it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedField {
    pub value: String,
    pub source: ProviderId,
}

/// Authoritative record for one content unit or lookup group.
///
/// Serializes as a JSON object keyed by field name, in name order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MergedRecord(BTreeMap<String, MergedField>);

impl MergedRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str) -> Option<&MergedField> {
        self.0.get(field)
    }

    pub fn value(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(|f| f.value.as_str())
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>, source: ProviderId) {
        self.0.insert(
            field.into(),
            MergedField {
                value: value.into(),
                source,
            },
        );
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MergedField)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy every group-scoped field of `group` onto this record, replacing
    /// whatever the unit carried for those fields.
    pub fn propagate(&mut self, group: &MergedRecord) {
        self.0.retain(|name, _| {
            field(name).is_some_and(|spec| spec.scope != FieldScope::Group)
        });
        for (name, merged) in &group.0 {
            if field(name).is_some_and(|spec| spec.scope == FieldScope::Group) {
                self.0.insert(name.clone(), merged.clone());
            }
        }
    }

    /// Canonical JSON form; identical records give identical bytes.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Applies a [`FieldPolicy`] to provider records.
#[derive(Debug, Clone, Default)]
pub struct MergeResolver {
    policy: FieldPolicy,
}

impl MergeResolver {
    pub fn new(policy: FieldPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &FieldPolicy {
        &self.policy
    }

    /// Merge one layer of records for `target`.
    pub fn merge(
        &self,
        target: &str,
        kind: EntityKind,
        scope: FieldScope,
        records: &[ProviderRecord],
    ) -> MergedRecord {
        self.merge_layered(target, kind, scope, &[records])
    }

    /// Merge several layers of records, earlier layers taking precedence
    /// within the same provider.
    pub fn merge_layered(
        &self,
        target: &str,
        kind: EntityKind,
        scope: FieldScope,
        layers: &[&[ProviderRecord]],
    ) -> MergedRecord {
        let indexed: Vec<BTreeMap<ProviderId, Vec<&ProviderRecord>>> = layers
            .iter()
            .map(|records| {
                let mut by_provider: BTreeMap<ProviderId, Vec<&ProviderRecord>> = BTreeMap::new();
                for record in records.iter() {
                    by_provider.entry(record.provider).or_default().push(record);
                }
                by_provider
            })
            .collect();

        let mut merged = MergedRecord::new();
        for spec in fields_for(kind, scope) {
            let order = self.policy.order(kind, spec.name);
            let winner = order.iter().find_map(|provider| {
                indexed.iter().find_map(|layer| {
                    let records = layer.get(provider)?;
                    best_value(target, spec, records).map(|value| (value, *provider))
                })
            });
            if let Some((value, source)) = winner {
                merged.insert(spec.name, value, source);
            }
        }
        merged
    }

    /// Combine a stored record with a freshly merged one.
    ///
    /// A fresh value replaces a stored value only when its source ranks
    /// strictly higher for that field. Stored fields that do not apply to
    /// `kind` are dropped.
    pub fn upgrade(
        &self,
        kind: EntityKind,
        existing: &MergedRecord,
        fresh: &MergedRecord,
    ) -> MergedRecord {
        let mut out = MergedRecord::new();

        for (name, stored) in existing.iter() {
            if field(name).is_some_and(|spec| spec.applies_to(kind)) {
                out.0.insert(name.to_string(), stored.clone());
            }
        }

        for (name, candidate) in fresh.iter() {
            if !field(name).is_some_and(|spec| spec.applies_to(kind)) {
                continue;
            }
            let replace = match out.0.get(name) {
                None => true,
                Some(stored) => {
                    let new_rank = self.policy.rank(kind, name, candidate.source);
                    let old_rank = self.policy.rank(kind, name, stored.source);
                    match (new_rank, old_rank) {
                        (Some(new), Some(old)) => new < old,
                        (Some(_), None) => true,
                        (None, _) => false,
                    }
                }
            };
            if replace {
                out.0.insert(name.to_string(), candidate.clone());
            }
        }

        out
    }
}

/// Smallest valid value among one provider's records for a field.
fn best_value(target: &str, spec: &FieldSpec, records: &[&ProviderRecord]) -> Option<String> {
    records
        .iter()
        .filter_map(|record| {
            let raw = record.get(spec.name)?;
            match spec.shape.validate(raw) {
                Some(value) => Some(value.to_string()),
                None => {
                    warn!(
                        target_key = target,
                        provider = %record.provider,
                        field = spec.name,
                        value = raw,
                        "Discarding malformed field value"
                    );
                    None
                }
            }
        })
        .min()
}
