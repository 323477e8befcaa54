//! Person use-case service.
//!
//! # Responsibility
//! - Provide stable person entry points for the request boundary.
//! - Delegate every call to the injected `PersonStore` unchanged.
//!
//! # Invariants
//! - No retries, caching or validation happen here.
//! - Results and errors are returned exactly as the store produced them.

use crate::context::CallContext;
use crate::model::person::{Person, PersonId, PersonProperties};
use crate::repo::person_repo::{PersonListQuery, PersonStore, StoreResult};

/// Use-case façade over a person store.
pub struct PersonService<S: PersonStore> {
    store: S,
}

impl<S: PersonStore> PersonService<S> {
    /// Creates a service using the provided store implementation.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn health_check(&self, ctx: &CallContext) -> StoreResult<()> {
        self.store.health_check(ctx)
    }

    pub fn list_persons(
        &self,
        ctx: &CallContext,
        query: &PersonListQuery,
    ) -> StoreResult<Vec<Person>> {
        self.store.list_persons(ctx, query)
    }

    pub fn create_person(
        &self,
        ctx: &CallContext,
        properties: &PersonProperties,
    ) -> StoreResult<Person> {
        self.store.create_person(ctx, properties)
    }

    pub fn get_person(&self, ctx: &CallContext, id: PersonId) -> StoreResult<Option<Person>> {
        self.store.get_person(ctx, id)
    }

    /// Merge-updates `target.id` with the supplied fields of `target`.
    pub fn update_person(&self, ctx: &CallContext, target: &Person) -> StoreResult<Option<Person>> {
        self.store.update_person(ctx, target)
    }

    pub fn delete_person(&self, ctx: &CallContext, id: PersonId) -> StoreResult<bool> {
        self.store.delete_person(ctx, id)
    }
}
