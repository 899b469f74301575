//! Entity writer: insert, update, upsert and delete of entity instances.
//!
//! Every method runs on a connection the caller already holds, so a store and a
//! transaction share the same code path.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use super::{in_transaction, StoreCore};
use crate::driver::Connection;
use crate::entity::{is_unassigned_key, Entity};
use crate::error::{QuarryError, Result};
use crate::meta::{Association, Attribute, Cardinality, CascadeAction, Link, Type};
use crate::query::element::Clause;
use crate::query::{
    Condition, Conjunction, Expr, FromSource, Operand, Operator, QueryElement, QueryKind,
};
use crate::reader::EntityReader;
use crate::value::Value;

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

/// Levels of one-to-many cascades a delete follows before giving up
const MAX_CASCADE_DEPTH: usize = 32;

pub(crate) struct EntityWriter<'a> {
    core: &'a StoreCore,
    ty: &'a Arc<Type>,
}

impl<'a> EntityWriter<'a> {
    pub(crate) fn new(core: &'a StoreCore, ty: &'a Arc<Type>) -> Self {
        Self { core, ty }
    }

    pub(crate) fn insert<E: Entity>(&self, conn: &mut dyn Connection, entity: &mut E) -> Result<()> {
        self.check_writable()?;
        self.pre_insert(entity)?;

        let (element, pending) = self.insert_element(entity);
        let statement = self.core.generate(&element)?;
        if pending.is_empty() {
            let affected = self.core.executor.update(conn, &statement)?;
            expect_rows(1, affected)?;
        } else {
            let mut cursor = self.core.executor.query(conn, &statement)?;
            let row = cursor.next_row()?;
            cursor.close();
            let row = row.ok_or(QuarryError::RowCount {
                expected: 1,
                actual: 0,
            })?;
            for (attribute, value) in pending.iter().zip(row) {
                entity.set(attribute.property(), value)?;
            }
        }

        self.post_insert(entity);
        Ok(())
    }

    /// Inserts `entities` in one transaction
    ///
    /// Chunks are multi-row `VALUES` sized to the parameter limit. With generated
    /// keys a chunk is one `INSERT … RETURNING` when its rows can be told apart by
    /// their values (see [`Self::insert_returning`]); otherwise its rows are
    /// inserted one at a time.
    pub(crate) fn insert_all<E: Entity>(
        &self,
        conn: &mut dyn Connection,
        entities: &mut [E],
    ) -> Result<()> {
        if entities.is_empty() {
            return Ok(());
        }
        self.check_writable()?;
        let batch_size = self.core.config.batch_update_size;

        in_transaction(conn, |conn| {
            if self.ty.has_generated_keys() {
                let keys = self.ty.generated_keys();
                let columns: Vec<Arc<Attribute>> = self
                    .ty
                    .columns()
                    .filter(|a| !(a.is_key() && a.is_generated()))
                    .cloned()
                    .collect();
                let matchable = self.core.config.platform.supports_returning()
                    && !columns.is_empty()
                    && columns.iter().all(|a| a.field_type().reads_back_exactly());
                let max_rows =
                    (self.core.config.platform.max_parameters() / columns.len().max(1)).max(1);
                for chunk in entities.chunks_mut(batch_size.min(max_rows)) {
                    self.record_batch(chunk.len());
                    let fresh = chunk.iter().all(|entity| {
                        keys.iter()
                            .all(|key| is_unassigned_key(&entity.get(key.property())))
                    });
                    if matchable && fresh && chunk.len() > 1 {
                        self.insert_returning(conn, chunk, &columns, &keys)?;
                        continue;
                    }
                    for entity in chunk.iter_mut() {
                        self.insert(conn, entity)?;
                    }
                }
                return Ok(());
            }

            let columns: Vec<Arc<Attribute>> = self.ty.columns().cloned().collect();
            let max_rows = (self.core.config.platform.max_parameters() / columns.len().max(1)).max(1);
            for chunk in entities.chunks_mut(batch_size.min(max_rows)) {
                self.record_batch(chunk.len());
                for entity in chunk.iter_mut() {
                    self.pre_insert(entity)?;
                }
                let mut element = QueryElement::on_table(QueryKind::Insert, self.ty.name());
                element.columns = columns.clone();
                element.rows = chunk
                    .iter()
                    .map(|entity| {
                        columns
                            .iter()
                            .map(|a| Expr::Literal(entity.get(a.property())))
                            .collect()
                    })
                    .collect();
                let statement = self.core.generate(&element)?;
                let affected = self.core.executor.update(conn, &statement)?;
                expect_rows(chunk.len() as u64, affected)?;
                for entity in chunk.iter() {
                    self.post_insert(entity);
                }
            }
            Ok(())
        })
    }

    /// One multi-row insert returning the generated keys of every row
    ///
    /// Databases do not promise `RETURNING` rows in `VALUES` order, so each
    /// returned row also carries the inserted columns and is matched to the
    /// entity that wrote those values. Entities with identical values are
    /// interchangeable and take the keys in returned order.
    fn insert_returning<E: Entity>(
        &self,
        conn: &mut dyn Connection,
        chunk: &mut [E],
        columns: &[Arc<Attribute>],
        keys: &[Arc<Attribute>],
    ) -> Result<()> {
        for entity in chunk.iter_mut() {
            self.pre_insert(entity)?;
        }
        let rows: Vec<Vec<Value>> = chunk
            .iter()
            .map(|entity| columns.iter().map(|a| entity.get(a.property())).collect())
            .collect();
        let mut waiting: HashMap<Vec<Value>, VecDeque<usize>> = HashMap::new();
        for (index, row) in rows.iter().enumerate() {
            waiting.entry(comparable(row)).or_default().push_back(index);
        }

        let mut element = QueryElement::on_table(QueryKind::Insert, self.ty.name());
        element.columns = columns.to_vec();
        element.rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(Expr::Literal).collect())
            .collect();
        element.returning = keys
            .iter()
            .chain(columns)
            .map(|a| Expr::Attribute(Arc::clone(a)))
            .collect();
        let statement = self.core.generate(&element)?;

        let mut cursor = self.core.executor.query(conn, &statement)?;
        let mut matched = 0u64;
        while let Some(mut row) = cursor.next_row()? {
            let inserted = row.split_off(keys.len().min(row.len()));
            let index = waiting
                .get_mut(&comparable(&inserted))
                .and_then(VecDeque::pop_front)
                .ok_or_else(|| {
                    QuarryError::Other(format!(
                        "a returned {} row matches no entity of the batch",
                        self.ty.name()
                    ))
                })?;
            for (key, value) in keys.iter().zip(row) {
                chunk[index].set(key.property(), value)?;
            }
            matched += 1;
        }
        cursor.close();
        expect_rows(chunk.len() as u64, matched)?;

        for entity in chunk.iter() {
            self.post_insert(entity);
        }
        Ok(())
    }

    /// Writes every non-key column, matching the row by key and, for versioned
    /// types, by the version the entity was loaded with.
    pub(crate) fn update<E: Entity>(&self, conn: &mut dyn Connection, entity: &mut E) -> Result<()> {
        self.check_writable()?;
        self.check_keyed()?;
        for listener in &self.core.config.entity_listeners {
            listener.pre_update(self.ty, entity)?;
        }

        let version = self.ty.version_attribute().cloned();
        let old_version = version.as_ref().map(|v| entity.get(v.property()));
        let new_version = old_version.as_ref().map(next_version);

        let mut element = QueryElement::on_table(QueryKind::Update, self.ty.name());
        for attribute in self.ty.columns().filter(|a| !a.is_key()) {
            let value = match (&new_version, attribute.is_version()) {
                (Some(next), true) => next.clone(),
                _ => entity.get(attribute.property()),
            };
            element
                .assignments
                .push((Arc::clone(attribute), Expr::Literal(value)));
        }
        if element.assignments.is_empty() {
            log::debug!("{} has no non-key columns; update skipped", self.ty.name());
            return Ok(());
        }
        self.match_row(&mut element, entity, old_version);

        let statement = self.core.generate(&element)?;
        let affected = self.core.executor.update(conn, &statement)?;
        if affected == 0 {
            return Err(self.missing_row());
        }
        expect_rows(1, affected)?;

        if let (Some(attribute), Some(next)) = (&version, new_version) {
            entity.set(attribute.property(), next)?;
        }
        for listener in &self.core.config.entity_listeners {
            listener.post_update(self.ty, entity);
        }
        Ok(())
    }

    /// `INSERT … ON CONFLICT (key) DO UPDATE`, or a plain insert while a generated
    /// key is still unassigned
    pub(crate) fn upsert<E: Entity>(&self, conn: &mut dyn Connection, entity: &mut E) -> Result<()> {
        self.check_writable()?;
        self.check_keyed()?;
        let unassigned = self
            .ty
            .generated_keys()
            .iter()
            .any(|key| is_unassigned_key(&entity.get(key.property())));
        if unassigned {
            return self.insert(conn, entity);
        }

        self.pre_insert(entity)?;
        let columns: Vec<Arc<Attribute>> = self.ty.columns().cloned().collect();
        let mut element = QueryElement::on_table(QueryKind::Upsert, self.ty.name());
        element.rows = vec![columns
            .iter()
            .map(|a| Expr::Literal(entity.get(a.property())))
            .collect()];
        element.columns = columns;
        element.conflict_keys = self.ty.key_attributes();

        let statement = self.core.generate(&element)?;
        let affected = self.core.executor.update(conn, &statement)?;
        if affected == 0 {
            return Err(QuarryError::RowCount {
                expected: 1,
                actual: 0,
            });
        }
        self.post_insert(entity);
        Ok(())
    }

    /// Deletes the row of `entity` with the junction rows and cascading
    /// one-to-many dependents that point at it
    ///
    /// Entity listeners only see `entity`, not the dependent rows.
    pub(crate) fn delete<E: Entity>(&self, conn: &mut dyn Connection, entity: &E) -> Result<()> {
        self.check_writable()?;
        self.check_keyed()?;
        for listener in &self.core.config.entity_listeners {
            listener.pre_delete(self.ty, entity)?;
        }

        let mut element = QueryElement::on_table(QueryKind::Delete, self.ty.name());
        let version = self
            .ty
            .version_attribute()
            .map(|v| entity.get(v.property()));
        self.match_row(&mut element, entity, version);
        let statement = self.core.generate(&element)?;

        let dependents = self.core.config.model.dependents(self.ty)?;
        let affected = if dependents.is_empty() {
            self.core.executor.update(conn, &statement)?
        } else {
            in_transaction(conn, |conn| {
                let values_of = |a: &Attribute| vec![entity.get(a.property())];
                delete_dependents(self.core, conn, self.ty, &values_of, 0)?;
                self.core.executor.update(conn, &statement)
            })?
        };
        if affected == 0 {
            return Err(self.missing_row());
        }
        expect_rows(1, affected)?;

        for listener in &self.core.config.entity_listeners {
            listener.post_delete(self.ty, entity);
        }
        Ok(())
    }

    /// Deletes `entities` in one transaction
    ///
    /// A type with one key and no version column is deleted with
    /// `key IN (…)` batches; anything else one entity at a time.
    pub(crate) fn delete_all<E: Entity>(&self, conn: &mut dyn Connection, entities: &[E]) -> Result<()> {
        if entities.is_empty() {
            return Ok(());
        }
        self.check_writable()?;
        self.check_keyed()?;

        let key = match (self.ty.single_key(), self.ty.version_attribute()) {
            (Some(key), None) => Some(Arc::clone(key)),
            _ => None,
        };

        in_transaction(conn, |conn| {
            let Some(key) = key else {
                for entity in entities {
                    self.delete(conn, entity)?;
                }
                return Ok(());
            };

            let chunk_size = self
                .core
                .config
                .batch_update_size
                .min(self.core.config.platform.max_parameters())
                .max(1);
            for chunk in entities.chunks(chunk_size) {
                self.record_batch(chunk.len());
                for entity in chunk {
                    for listener in &self.core.config.entity_listeners {
                        listener.pre_delete(self.ty, entity)?;
                    }
                }
                let values_of = |a: &Attribute| -> Vec<Value> {
                    chunk.iter().map(|e| e.get(a.property())).collect()
                };
                delete_dependents(self.core, conn, self.ty, &values_of, 0)?;
                let keys = chunk.iter().map(|e| e.get(key.property())).collect();
                let mut element = QueryElement::on_table(QueryKind::Delete, self.ty.name());
                element.push_condition(
                    Clause::Where,
                    None,
                    Condition::compare(
                        Expr::Attribute(Arc::clone(&key)),
                        Operator::In,
                        Operand::Values(keys),
                    ),
                );
                let statement = self.core.generate(&element)?;
                let affected = self.core.executor.update(conn, &statement)?;
                expect_rows(chunk.len() as u64, affected)?;
                for entity in chunk {
                    for listener in &self.core.config.entity_listeners {
                        listener.post_delete(self.ty, entity);
                    }
                }
            }
            Ok(())
        })
    }

    /// Inserts a new entity, updates a stored one
    ///
    /// An entity is new while a generated key or its version is unassigned. A
    /// type with neither is upserted.
    pub(crate) fn save<E: Entity>(&self, conn: &mut dyn Connection, entity: &mut E) -> Result<()> {
        let unassigned = |attribute: &Arc<Attribute>| {
            is_unassigned_key(&entity.get(attribute.property()))
        };
        let generated = self.ty.generated_keys();
        let new_key = generated.iter().any(unassigned);
        let version = self.ty.version_attribute().map(unassigned);
        match (new_key, version) {
            (true, _) | (false, Some(true)) => self.insert(conn, entity),
            (false, Some(false)) => self.update(conn, entity),
            (false, None) if !generated.is_empty() => self.update(conn, entity),
            (false, None) => self.upsert(conn, entity),
        }
    }

    /// Saves `source` and makes `targets` the entities it is associated with
    /// through `association`, in one transaction
    ///
    /// Targets are saved too when the association cascades saves; otherwise they
    /// must already be stored and only their link is written. An owning side with
    /// no target has its foreign key cleared. Existing junction links stay,
    /// including links to entities not in `targets`.
    pub(crate) fn save_related<S: Entity, T: Entity>(
        &self,
        conn: &mut dyn Connection,
        association: &Association,
        source: &mut S,
        targets: &mut [T],
    ) -> Result<()> {
        self.check_writable()?;
        let single = matches!(
            association.cardinality(),
            Some(Cardinality::OneToOne | Cardinality::ManyToOne)
        );
        if single && targets.len() > 1 {
            return Err(QuarryError::UnsupportedOperation(format!(
                "{}.{} holds one entity, got {}",
                self.ty.name(),
                association.attribute.property(),
                targets.len()
            )));
        }
        let target_writer = EntityWriter::new(self.core, &association.target);
        let cascade = association.attribute.cascades(CascadeAction::Save);

        in_transaction(conn, |conn| {
            match &association.link {
                Link::Owning {
                    source_fk,
                    target_column,
                } => {
                    let value = match targets.first_mut() {
                        Some(target) => {
                            if cascade {
                                target_writer.save(conn, target)?;
                            }
                            target_writer.stored_value(target, target_column)?
                        }
                        None => Value::Null,
                    };
                    source.set(source_fk.property(), value)?;
                    self.save(conn, source)
                }
                Link::Inverse {
                    source_column,
                    target_fk,
                } => {
                    self.save(conn, source)?;
                    let value = self.stored_value(source, source_column)?;
                    for target in targets.iter_mut() {
                        target.set(target_fk.property(), value.clone())?;
                        if cascade {
                            target_writer.save(conn, target)?;
                        } else {
                            target_writer.write_column(conn, target, target_fk, value.clone())?;
                        }
                    }
                    Ok(())
                }
                Link::Junction {
                    junction,
                    source_column,
                    source_fk,
                    target_column,
                    target_fk,
                } => {
                    self.save(conn, source)?;
                    let value = self.stored_value(source, source_column)?;
                    let mut linked: HashSet<Value> = select_where_in(
                        self.core,
                        conn,
                        junction,
                        std::slice::from_ref(target_fk),
                        source_fk,
                        std::slice::from_ref(&value),
                    )?
                    .into_iter()
                    .filter_map(|mut row| row.pop())
                    .collect();

                    let mut links = Vec::new();
                    for target in targets.iter_mut() {
                        if cascade {
                            target_writer.save(conn, target)?;
                        }
                        let target_value = target_writer.stored_value(target, target_column)?;
                        if linked.insert(target_value.clone()) {
                            links.push(vec![
                                Expr::Literal(value.clone()),
                                Expr::Literal(target_value),
                            ]);
                        }
                    }
                    let max_rows = (self.core.config.platform.max_parameters() / 2).max(1);
                    for rows in links.chunks(max_rows) {
                        let mut element = QueryElement::on_table(QueryKind::Insert, junction.name());
                        element.columns = vec![Arc::clone(source_fk), Arc::clone(target_fk)];
                        element.rows = rows.to_vec();
                        let statement = self.core.generate(&element)?;
                        let affected = self.core.executor.update(conn, &statement)?;
                        expect_rows(rows.len() as u64, affected)?;
                    }
                    Ok(())
                }
            }
        })
    }

    /// Removes the link between `source` and `targets` without deleting either
    ///
    /// Junction rows are deleted; one-to-many targets get a null foreign key.
    /// Returns the number of links removed.
    pub(crate) fn unlink<S: Entity, T: Entity>(
        &self,
        conn: &mut dyn Connection,
        association: &Association,
        source: &S,
        targets: &mut [T],
    ) -> Result<u64> {
        if targets.is_empty() {
            return Ok(0);
        }
        let target_writer = EntityWriter::new(self.core, &association.target);
        let value = self.stored_value(source, association.source_value_attribute())?;

        // rows of `table` where `column` = the source value and `matched_by` is
        // one of the targets' `target_column` values
        let (kind, table, column, matched_by, target_column) = match &association.link {
            Link::Junction {
                junction,
                source_fk,
                target_column,
                target_fk,
                ..
            } => (QueryKind::Delete, junction, source_fk, target_fk, target_column),
            Link::Inverse { target_fk, .. } => {
                let key = association.target.single_key().ok_or_else(|| {
                    QuarryError::UnsupportedOperation(format!(
                        "{} does not have a single key",
                        association.target.name()
                    ))
                })?;
                (QueryKind::Update, &association.target, target_fk, key, key)
            }
            Link::Owning { .. } => {
                return Err(QuarryError::UnsupportedOperation(format!(
                    "{}.{} is a foreign key; clear it and update the entity",
                    self.ty.name(),
                    association.attribute.property()
                )))
            }
        };

        let target_values = targets
            .iter()
            .map(|target| target_writer.stored_value(target, target_column))
            .collect::<Result<Vec<_>>>()?;
        in_transaction(conn, |conn| {
            let mut removed = 0;
            let chunk_size = self
                .core
                .config
                .platform
                .max_parameters()
                .saturating_sub(1)
                .max(1);
            for chunk in target_values.chunks(chunk_size) {
                let mut element = QueryElement::on_table(kind, table.name());
                if kind == QueryKind::Update {
                    element
                        .assignments
                        .push((Arc::clone(column), Expr::Literal(Value::Null)));
                }
                element.push_condition(
                    Clause::Where,
                    None,
                    Condition::compare(
                        Expr::Attribute(Arc::clone(column)),
                        Operator::Equal,
                        Operand::Value(value.clone()),
                    ),
                );
                element.push_condition(
                    Clause::Where,
                    Some(Conjunction::And),
                    in_values(matched_by, chunk),
                );
                let statement = self.core.generate(&element)?;
                removed += self.core.executor.update(conn, &statement)?;
            }
            if kind == QueryKind::Update {
                for target in targets.iter_mut() {
                    target.set(column.property(), Value::Null)?;
                }
            }
            Ok(removed)
        })
    }

    /// Value of `attribute` on a stored entity
    fn stored_value<E: Entity>(&self, entity: &E, attribute: &Attribute) -> Result<Value> {
        let value = entity.get(attribute.property());
        if is_unassigned_key(&value) {
            return Err(QuarryError::UnsupportedOperation(format!(
                "{} is not saved; {} is unset",
                self.ty.name(),
                attribute.property()
            )));
        }
        Ok(value)
    }

    /// `UPDATE … SET column = ? WHERE key = ?` for one stored entity
    fn write_column<E: Entity>(
        &self,
        conn: &mut dyn Connection,
        entity: &E,
        attribute: &Arc<Attribute>,
        value: Value,
    ) -> Result<()> {
        self.check_keyed()?;
        for key in self.ty.key_attributes() {
            self.stored_value(entity, &key)?;
        }
        let mut element = QueryElement::on_table(QueryKind::Update, self.ty.name());
        element
            .assignments
            .push((Arc::clone(attribute), Expr::Literal(value)));
        self.match_row(&mut element, entity, None);
        let statement = self.core.generate(&element)?;
        let affected = self.core.executor.update(conn, &statement)?;
        if affected == 0 {
            return Err(self.missing_row());
        }
        Ok(())
    }

    /// Reloads every column of `entity` from the row with its key
    pub(crate) fn refresh<E: Entity>(&self, conn: &mut dyn Connection, entity: &mut E) -> Result<()> {
        self.check_keyed()?;
        let selection: Vec<Expr> = self
            .ty
            .columns()
            .map(|a| Expr::Attribute(Arc::clone(a)))
            .collect();
        let mut element = QueryElement::select(selection);
        element.from.push(crate::query::FromSource::Table(self.ty.name().to_string()));
        self.match_row(&mut element, entity, None);

        let statement = self.core.generate(&element)?;
        let mut cursor = self.core.executor.query(conn, &statement)?;
        let columns = Arc::clone(cursor.columns());
        let row = cursor.next_row()?;
        cursor.close();
        let row = row.ok_or(QuarryError::RowCount {
            expected: 1,
            actual: 0,
        })?;

        let reader = EntityReader::<E>::for_selection(
            Arc::clone(self.ty),
            &element.selection,
            self.core.config.entity_listeners.clone(),
        );
        reader.fill(entity, &columns, row)
    }

    /// Insert statement for one entity, and the generated keys it must read back
    fn insert_element<E: Entity>(&self, entity: &E) -> (QueryElement, Vec<Arc<Attribute>>) {
        let mut element = QueryElement::on_table(QueryKind::Insert, self.ty.name());
        let mut pending = Vec::new();
        let mut row = Vec::new();
        for attribute in self.ty.columns() {
            let value = entity.get(attribute.property());
            if attribute.is_generated() && attribute.is_key() && is_unassigned_key(&value) {
                pending.push(Arc::clone(attribute));
                continue;
            }
            element.columns.push(Arc::clone(attribute));
            row.push(Expr::Literal(value));
        }
        if !row.is_empty() {
            element.rows.push(row);
        }
        element.returning = pending
            .iter()
            .map(|a| Expr::Attribute(Arc::clone(a)))
            .collect();
        (element, pending)
    }

    /// `WHERE key = ? AND … [AND version = ?]`
    fn match_row<E: Entity>(&self, element: &mut QueryElement, entity: &E, version: Option<Value>) {
        let keys = self.ty.key_attributes();
        let version = self.ty.version_attribute().zip(version);
        let predicates = keys
            .iter()
            .map(|key| (key, entity.get(key.property())))
            .chain(version);
        for (attribute, value) in predicates {
            element.push_condition(
                Clause::Where,
                Some(Conjunction::And),
                Condition::compare(
                    Expr::Attribute(Arc::clone(attribute)),
                    Operator::Equal,
                    Operand::Value(value),
                ),
            );
        }
    }

    fn pre_insert<E: Entity>(&self, entity: &mut E) -> Result<()> {
        for listener in &self.core.config.entity_listeners {
            listener.pre_insert(self.ty, entity)?;
        }
        if let Some(version) = self.ty.version_attribute() {
            entity.set(version.property(), Value::Integer(1))?;
        }
        Ok(())
    }

    fn post_insert<E: Entity>(&self, entity: &E) {
        for listener in &self.core.config.entity_listeners {
            listener.post_insert(self.ty, entity);
        }
    }

    fn missing_row(&self) -> QuarryError {
        if self.ty.version_attribute().is_some() {
            QuarryError::OptimisticLock {
                type_name: self.ty.name().to_string(),
            }
        } else {
            QuarryError::RowCount {
                expected: 1,
                actual: 0,
            }
        }
    }

    fn check_writable(&self) -> Result<()> {
        if self.ty.is_read_only() || self.ty.is_view() {
            return Err(QuarryError::UnsupportedOperation(format!(
                "{} is read only",
                self.ty.name()
            )));
        }
        Ok(())
    }

    fn check_keyed(&self) -> Result<()> {
        if self.ty.key_attributes().is_empty() {
            return Err(QuarryError::UnsupportedOperation(format!(
                "{} has no key attribute",
                self.ty.name()
            )));
        }
        Ok(())
    }

    fn record_batch(&self, rows: usize) {
        log::debug!("writing batch of {rows} {} row(s)", self.ty.name());
        #[cfg(feature = "metrics")]
        METRICS.record_batch();
    }
}

/// Deletes the junction rows and the cascading one-to-many dependents of the
/// `ty` rows described by `values_of`, deepest first
fn delete_dependents(
    core: &StoreCore,
    conn: &mut dyn Connection,
    ty: &Arc<Type>,
    values_of: &dyn Fn(&Attribute) -> Vec<Value>,
    depth: usize,
) -> Result<()> {
    if depth > MAX_CASCADE_DEPTH {
        return Err(QuarryError::UnsupportedOperation(format!(
            "delete cascades from {} more than {MAX_CASCADE_DEPTH} levels deep",
            ty.name()
        )));
    }
    for association in core.config.model.dependents(ty)? {
        let values: Vec<Value> = values_of(association.source_value_attribute())
            .into_iter()
            .filter(|v| !v.is_null())
            .collect();
        if values.is_empty() {
            continue;
        }
        match &association.link {
            Link::Junction {
                junction, source_fk, ..
            } => {
                delete_where_in(core, conn, junction, source_fk, &values)?;
            }
            Link::Inverse { target_fk, .. }
                if association.attribute.cascades(CascadeAction::Delete) =>
            {
                let target = &association.target;
                let nested = core.config.model.dependents(target)?;
                if !nested.is_empty() {
                    let mut columns: Vec<Arc<Attribute>> = Vec::new();
                    for dependent in &nested {
                        let column = dependent.source_value_attribute();
                        if !columns.iter().any(|c| Arc::ptr_eq(c, column)) {
                            columns.push(Arc::clone(column));
                        }
                    }
                    let rows = select_where_in(core, conn, target, &columns, target_fk, &values)?;
                    let nested_values = |a: &Attribute| -> Vec<Value> {
                        match columns.iter().position(|c| c.name() == a.name()) {
                            Some(i) => rows.iter().filter_map(|row| row.get(i).cloned()).collect(),
                            None => Vec::new(),
                        }
                    };
                    delete_dependents(core, conn, target, &nested_values, depth + 1)?;
                }
                delete_where_in(core, conn, target, target_fk, &values)?;
            }
            _ => {}
        }
    }
    Ok(())
}

/// `DELETE FROM table WHERE column IN (…)`, chunked to the parameter limit
fn delete_where_in(
    core: &StoreCore,
    conn: &mut dyn Connection,
    ty: &Type,
    column: &Arc<Attribute>,
    values: &[Value],
) -> Result<u64> {
    let mut removed = 0;
    for chunk in values.chunks(core.config.platform.max_parameters().max(1)) {
        let mut element = QueryElement::on_table(QueryKind::Delete, ty.name());
        element.push_condition(Clause::Where, None, in_values(column, chunk));
        let statement = core.generate(&element)?;
        removed += core.executor.update(conn, &statement)?;
    }
    log::debug!("cascade removed {removed} {} row(s)", ty.name());
    Ok(removed)
}

/// `SELECT columns FROM table WHERE column IN (…)`, chunked to the parameter limit
fn select_where_in(
    core: &StoreCore,
    conn: &mut dyn Connection,
    ty: &Type,
    columns: &[Arc<Attribute>],
    column: &Arc<Attribute>,
    values: &[Value],
) -> Result<Vec<Vec<Value>>> {
    let mut rows = Vec::new();
    for chunk in values.chunks(core.config.platform.max_parameters().max(1)) {
        let mut element =
            QueryElement::select(columns.iter().map(|a| Expr::Attribute(Arc::clone(a))).collect());
        element.from.push(FromSource::Table(ty.name().to_string()));
        element.push_condition(Clause::Where, None, in_values(column, chunk));
        let statement = core.generate(&element)?;
        let mut cursor = core.executor.query(conn, &statement)?;
        while let Some(row) = cursor.next_row()? {
            rows.push(row);
        }
        cursor.close();
    }
    Ok(rows)
}

fn in_values(column: &Arc<Attribute>, values: &[Value]) -> Condition {
    Condition::compare(
        Expr::Attribute(Arc::clone(column)),
        Operator::In,
        Operand::Values(values.to_vec()),
    )
}

/// Row values as the database reads them back; booleans come back as integers
/// from SQLite
fn comparable(row: &[Value]) -> Vec<Value> {
    row.iter()
        .map(|value| match value {
            Value::Bool(b) => Value::Integer(i64::from(*b)),
            other => other.clone(),
        })
        .collect()
}

fn next_version(current: &Value) -> Value {
    Value::Integer(current.as_i64().unwrap_or(0) + 1)
}

fn expect_rows(expected: u64, actual: u64) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(QuarryError::RowCount { expected, actual })
    }
}
