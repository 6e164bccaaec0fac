//! Relationship loading
//!
//! Relations are declared on the parent record with [`record!`](crate::record)
//! and loaded in bulk: the [`Loader`] collects the join keys of every parent,
//! fetches all related rows with one `IN (...)` query per batch and hands each
//! row to the parent(s) whose key it carries. Nested relations (`"author.role"`)
//! are loaded level by level over the records the previous level produced.

use super::model::{Model, Sequence};
use super::registry::Registry;
use super::table::{short_type_name, Column, Record, Table};
use crate::core::db::Queryer;
use crate::core::{RelbindError, Result};
use serde::{Deserialize, Serialize};
use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Cardinality of a declared relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// Related record stored in an `Option<Box<R>>` field.
    HasOne,
    /// Related records stored in a `Vec<R>` or `Vec<Box<R>>` field.
    HasMany,
}

/// Columns that join a parent to its related rows: `parent.local = related.foreign`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct JoinKeys {
    pub local: &'static str,
    pub foreign: &'static str,
}

/// Writable target a path step resolved to, with its type erased.
pub(crate) enum TargetMut<'a> {
    One(&'a mut (dyn Any + 'static)),
    /// The container field itself (`Vec<R>` or `Vec<Box<R>>`).
    Many(&'a mut (dyn Any + 'static)),
}

pub(crate) enum TargetRef<'a> {
    One(&'a (dyn Any + 'static)),
    Many(&'a (dyn Any + 'static)),
    /// A to-one field on the way is still `None`.
    Unset,
}

/// Record type and cardinality a field path ends at.
pub(crate) struct Terminal {
    pub type_id: TypeId,
    pub type_name: &'static str,
    pub kind: RelationKind,
}

/// Operations on one declared relation of parent type `P`.
pub(crate) trait RelationOps<P: Record>: Send + Sync {
    fn name(&self) -> &'static str;

    fn kind(&self) -> RelationKind;

    /// Validates the remaining path steps and reports where they end.
    fn terminal(&self, rest: &[String], registry: &Registry) -> Result<Terminal>;

    /// Follows the path below `owner`, creating absent records on the way.
    fn resolve_mut<'o>(&self, owner: &'o mut P, rest: &[String], registry: &Registry) -> Result<TargetMut<'o>>;

    /// Follows the path below `owner` without modifying it.
    fn resolve_ref<'o>(&self, owner: &'o P, rest: &[String], registry: &Registry) -> Result<TargetRef<'o>>;

    /// Loads this relation for every parent, then the `rest` of the path
    /// below the loaded records.
    fn load(&self, parents: Vec<&mut P>, rest: &[String], loader: &Loader<'_>) -> Result<()>;
}

fn descend_terminal<R: Record>(rest: &[String], registry: &Registry) -> Result<Terminal> {
    let table = registry.table::<R>()?;
    match rest.split_first() {
        None => Err(RelbindError::App("empty path tail".to_string())),
        Some((first, rest)) => table.relation_step(first)?.terminal(rest, registry),
    }
}

fn descend_mut<'o, R: Record>(record: &'o mut R, rest: &[String], registry: &Registry) -> Result<TargetMut<'o>> {
    let table = registry.table::<R>()?;
    match rest.split_first() {
        None => Ok(TargetMut::One(record)),
        Some((first, rest)) => table.relation_step(first)?.resolve_mut(record, rest, registry),
    }
}

fn descend_ref<'o, R: Record>(record: &'o R, rest: &[String], registry: &Registry) -> Result<TargetRef<'o>> {
    let table = registry.table::<R>()?;
    match rest.split_first() {
        None => Ok(TargetRef::One(record)),
        Some((first, rest)) => table.relation_step(first)?.resolve_ref(record, rest, registry),
    }
}

pub(crate) struct HasOne<P, R> {
    name: &'static str,
    keys: JoinKeys,
    get: fn(&P) -> &Option<Box<R>>,
    get_mut: fn(&mut P) -> &mut Option<Box<R>>,
}

impl<P, R> HasOne<P, R> {
    pub(crate) fn new(
        name: &'static str,
        keys: JoinKeys,
        get: fn(&P) -> &Option<Box<R>>,
        get_mut: fn(&mut P) -> &mut Option<Box<R>>,
    ) -> Self {
        HasOne {
            name,
            keys,
            get,
            get_mut,
        }
    }
}

impl<P: Record, R: Record> RelationOps<P> for HasOne<P, R> {
    fn name(&self) -> &'static str {
        self.name
    }

    fn kind(&self) -> RelationKind {
        RelationKind::HasOne
    }

    fn terminal(&self, rest: &[String], registry: &Registry) -> Result<Terminal> {
        if rest.is_empty() {
            return Ok(Terminal {
                type_id: TypeId::of::<R>(),
                type_name: short_type_name::<R>(),
                kind: RelationKind::HasOne,
            });
        }
        descend_terminal::<R>(rest, registry)
    }

    fn resolve_mut<'o>(&self, owner: &'o mut P, rest: &[String], registry: &Registry) -> Result<TargetMut<'o>> {
        let record: &'o mut R = (self.get_mut)(owner).get_or_insert_with(Box::default);
        descend_mut(record, rest, registry)
    }

    fn resolve_ref<'o>(&self, owner: &'o P, rest: &[String], registry: &Registry) -> Result<TargetRef<'o>> {
        match (self.get)(owner) {
            None => Ok(TargetRef::Unset),
            Some(record) => descend_ref::<R>(record, rest, registry),
        }
    }

    fn load(&self, mut parents: Vec<&mut P>, rest: &[String], loader: &Loader<'_>) -> Result<()> {
        let tables = loader.join_tables::<P, R>(self.keys)?;
        let join = tables.join()?;
        let rows = loader.fetch(&join, &parents)?;
        let groups = RowGroups::new(rows, join.foreign);

        let mut matched = HashSet::new();
        for parent in parents.iter_mut() {
            *(self.get_mut)(&mut **parent) = None;
            let Some(key) = key_text(join.local, &**parent) else {
                continue;
            };
            if let Some(rows) = groups.get(&key) {
                let mut target = loader.registry.model_path::<R, P>(&mut **parent, &[self.name])?;
                *target.current_mut()? = rows[0].clone();
                matched.insert(key);
            }
        }
        loader.check_orphans(self.name, &groups, &matched)?;

        if rest.is_empty() {
            return Ok(());
        }
        let children: Vec<&mut R> = parents
            .into_iter()
            .filter_map(|parent| (self.get_mut)(parent).as_deref_mut())
            .collect();
        loader.load_steps(children, rest)
    }
}

pub(crate) struct HasMany<P, R, C> {
    name: &'static str,
    keys: JoinKeys,
    get: fn(&P) -> &C,
    get_mut: fn(&mut P) -> &mut C,
    related: PhantomData<fn() -> R>,
}

impl<P, R, C> HasMany<P, R, C> {
    pub(crate) fn new(name: &'static str, keys: JoinKeys, get: fn(&P) -> &C, get_mut: fn(&mut P) -> &mut C) -> Self {
        HasMany {
            name,
            keys,
            get,
            get_mut,
            related: PhantomData,
        }
    }

    fn past_sequence(&self) -> RelbindError {
        RelbindError::UnsupportedShape(format!(
            "field path continues past sequence field {:?}",
            self.name
        ))
    }
}

impl<P, R, C> RelationOps<P> for HasMany<P, R, C>
where
    P: Record,
    R: Record,
    C: Sequence<R> + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn kind(&self) -> RelationKind {
        RelationKind::HasMany
    }

    fn terminal(&self, rest: &[String], _registry: &Registry) -> Result<Terminal> {
        if !rest.is_empty() {
            return Err(self.past_sequence());
        }
        Ok(Terminal {
            type_id: TypeId::of::<R>(),
            type_name: short_type_name::<R>(),
            kind: RelationKind::HasMany,
        })
    }

    fn resolve_mut<'o>(&self, owner: &'o mut P, rest: &[String], _registry: &Registry) -> Result<TargetMut<'o>> {
        if !rest.is_empty() {
            return Err(self.past_sequence());
        }
        Ok(TargetMut::Many((self.get_mut)(owner)))
    }

    fn resolve_ref<'o>(&self, owner: &'o P, rest: &[String], _registry: &Registry) -> Result<TargetRef<'o>> {
        if !rest.is_empty() {
            return Err(self.past_sequence());
        }
        Ok(TargetRef::Many((self.get)(owner)))
    }

    fn load(&self, mut parents: Vec<&mut P>, rest: &[String], loader: &Loader<'_>) -> Result<()> {
        let tables = loader.join_tables::<P, R>(self.keys)?;
        let join = tables.join()?;
        let rows = loader.fetch(&join, &parents)?;
        let groups = RowGroups::new(rows, join.foreign);

        let mut matched = HashSet::new();
        for parent in parents.iter_mut() {
            let key = key_text(join.local, &**parent);
            let mut target = loader.registry.model_path::<R, P>(&mut **parent, &[self.name])?;
            target.reset()?;
            let Some(key) = key else {
                continue;
            };
            if let Some(rows) = groups.get(&key) {
                for row in rows {
                    *target.allocate_next_element()? = row.clone();
                }
                matched.insert(key);
            }
        }
        loader.check_orphans(self.name, &groups, &matched)?;

        if rest.is_empty() {
            return Ok(());
        }
        let children: Vec<&mut R> = parents
            .into_iter()
            .flat_map(|parent| (self.get_mut)(parent).elements_mut())
            .collect();
        loader.load_steps(children, rest)
    }
}

/// What to do with a fetched row whose key matches no parent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrphanPolicy {
    /// Log the row and drop it.
    #[default]
    Skip,
    /// Fail the load with `OrphanRow`.
    Error,
}

/// Tuning for [`Loader`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Maximum number of keys per `IN (...)` list.
    pub batch_size: usize,
    pub orphan_policy: OrphanPolicy,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        LoaderConfig {
            batch_size: 500,
            orphan_policy: OrphanPolicy::Skip,
        }
    }
}

/// Metadata for one parent/related pair, looked up once per load.
struct Join<'t, P: Record, R: Record> {
    related: &'t Table<R>,
    local: &'t Column<P>,
    foreign: &'t Column<R>,
}

struct JoinTables<P: Record, R: Record> {
    parent: Arc<Table<P>>,
    related: Arc<Table<R>>,
    keys: JoinKeys,
}

impl<P: Record, R: Record> JoinTables<P, R> {
    fn join(&self) -> Result<Join<'_, P, R>> {
        Ok(Join {
            related: &self.related,
            local: join_column(&self.parent, self.keys.local)?,
            foreign: join_column(&self.related, self.keys.foreign)?,
        })
    }
}

fn join_column<'t, T: Record>(table: &'t Table<T>, name: &str) -> Result<&'t Column<T>> {
    table.column(name).ok_or_else(|| RelbindError::UnknownColumn {
        record: table.type_name(),
        column: name.to_string(),
    })
}

/// Textual key as the server returns it; rows and parents are matched on it.
/// `None` for a SQL `NULL`, which matches nothing.
fn key_text<T>(column: &Column<T>, record: &T) -> Option<Vec<u8>> {
    key_literal(column, record)?;
    let mut b = Vec::new();
    column.append_value(&mut b, record, false);
    Some(b)
}

fn key_literal<T>(column: &Column<T>, record: &T) -> Option<Vec<u8>> {
    let mut b = Vec::new();
    column.append_value(&mut b, record, true);
    if b.as_slice() == b"NULL" {
        return None;
    }
    Some(b)
}

/// Fetched rows grouped by their foreign key. Keys keep first-seen order
/// and rows keep fetch order within a group.
struct RowGroups<R> {
    keys: Vec<Vec<u8>>,
    rows: HashMap<Vec<u8>, Vec<R>>,
}

impl<R> RowGroups<R> {
    fn new(rows: Vec<R>, foreign: &Column<R>) -> Self {
        let mut groups = RowGroups {
            keys: Vec::new(),
            rows: HashMap::new(),
        };
        for row in rows {
            let Some(key) = key_text(foreign, &row) else {
                trace!("Dropping related row with a NULL key");
                continue;
            };
            match groups.rows.get_mut(&key) {
                Some(group) => group.push(row),
                None => {
                    groups.keys.push(key.clone());
                    groups.rows.insert(key, vec![row]);
                }
            }
        }
        groups
    }

    fn get(&self, key: &[u8]) -> Option<&Vec<R>> {
        self.rows.get(key)
    }
}

/// Loads declared relations for already-fetched parent records.
pub struct Loader<'q> {
    queryer: &'q dyn Queryer,
    registry: &'q Registry,
    config: LoaderConfig,
}

impl<'q> Loader<'q> {
    /// Creates a loader issuing its queries through `queryer`.
    pub fn new(queryer: &'q dyn Queryer) -> Self {
        Loader {
            queryer,
            registry: Registry::global(),
            config: LoaderConfig::default(),
        }
    }

    pub fn with_registry(mut self, registry: &'q Registry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_config(mut self, config: LoaderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Loads the relation named by `path` into every record `model` is
    /// bound to. `path` may be dotted (`"author.role"`) to load nested
    /// relations level by level.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedShape` when a step names no relation, any error
    /// from the queryer, and `OrphanRow` when the orphan policy is `Error`.
    pub fn load<P: Record>(&self, model: &mut Model<'_, P>, path: &str) -> Result<()> {
        let steps: Vec<String> = path.split('.').map(str::to_string).collect();
        debug!("Loading relation {} for {}", path, model.table().type_name());
        let parents = model.elements_mut()?;
        self.load_steps(parents, &steps)
    }

    /// Loads `path` for a plain slice of parent records.
    pub fn load_all<P: Record>(&self, parents: &mut [P], path: &str) -> Result<()> {
        let steps: Vec<String> = path.split('.').map(str::to_string).collect();
        self.load_steps(parents.iter_mut().collect(), &steps)
    }

    fn load_steps<P: Record>(&self, parents: Vec<&mut P>, steps: &[String]) -> Result<()> {
        let Some((first, rest)) = steps.split_first() else {
            return Ok(());
        };
        if parents.is_empty() {
            debug!("No parents to load {} for", first);
            return Ok(());
        }
        let table = self.registry.table::<P>()?;
        table.relation_step(first)?.load(parents, rest, self)
    }

    fn join_tables<P: Record, R: Record>(&self, keys: JoinKeys) -> Result<JoinTables<P, R>> {
        Ok(JoinTables {
            parent: self.registry.table::<P>()?,
            related: self.registry.table::<R>()?,
            keys,
        })
    }

    /// Fetches every related row whose foreign key matches a parent's
    /// local key, one query per batch of distinct keys.
    fn fetch<P: Record, R: Record>(&self, join: &Join<'_, P, R>, parents: &[&mut P]) -> Result<Vec<R>> {
        let mut seen = HashSet::new();
        let keys: Vec<Vec<u8>> = parents
            .iter()
            .filter_map(|parent| key_literal(join.local, &**parent))
            .filter(|key| seen.insert(key.clone()))
            .collect();

        let mut rows: Vec<R> = Vec::new();
        if keys.is_empty() {
            debug!("No join keys for {}, skipping query", join.related.name());
            return Ok(rows);
        }

        {
            let mut model = self.registry.model_sequence::<R>(&mut rows)?;
            let columns = model.columns("").join(", ");
            for batch in keys.chunks(self.config.batch_size.max(1)) {
                let sql = select_in(join.related.name(), &columns, join.foreign.name(), batch)?;
                debug!("Executing relation query: {}", sql);
                let count = self.queryer.query(&mut model, &sql)?;
                trace!("Batch of {} keys returned {} rows", batch.len(), count);
            }
        }
        debug!("Fetched {} {} rows for {} keys", rows.len(), join.related.name(), keys.len());
        Ok(rows)
    }

    fn check_orphans<R>(
        &self,
        relation: &str,
        groups: &RowGroups<R>,
        matched: &HashSet<Vec<u8>>,
    ) -> Result<()> {
        for key in &groups.keys {
            if matched.contains(key) {
                continue;
            }
            let count = groups.get(key).map_or(0, Vec::len);
            let key = String::from_utf8_lossy(key).into_owned();
            match self.config.orphan_policy {
                OrphanPolicy::Skip => {
                    warn!("Skipping {} orphan row(s) with key {} in relation {}", count, key, relation);
                }
                OrphanPolicy::Error => {
                    return Err(RelbindError::OrphanRow {
                        relation: relation.to_string(),
                        key,
                    });
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Loader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loader").field("config", &self.config).finish()
    }
}

fn select_in(table: &str, columns: &str, foreign: &str, keys: &[Vec<u8>]) -> Result<String> {
    let mut sql = format!("SELECT {} FROM {} WHERE {}.{} IN (", columns, table, table, foreign).into_bytes();
    for (i, key) in keys.iter().enumerate() {
        if i > 0 {
            sql.extend_from_slice(b", ");
        }
        sql.extend_from_slice(key);
    }
    sql.push(b')');
    String::from_utf8(sql).map_err(|e| RelbindError::Query(format!("relation query is not valid UTF-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_in() {
        let keys = vec![b"1".to_vec(), b"'a''b'".to_vec()];
        let sql = select_in("entry", "entry.id AS \"id\"", "author_id", &keys).unwrap();
        assert_eq!(
            sql,
            "SELECT entry.id AS \"id\" FROM entry WHERE entry.author_id IN (1, 'a''b')"
        );
    }

    #[test]
    fn test_loader_config_defaults() {
        let config = LoaderConfig::default();
        assert_eq!(config.batch_size, 500);
        assert_eq!(config.orphan_policy, OrphanPolicy::Skip);

        let parsed: LoaderConfig = toml::from_str("orphan_policy = \"error\"").unwrap();
        assert_eq!(parsed.batch_size, 500);
        assert_eq!(parsed.orphan_policy, OrphanPolicy::Error);
    }
}
