//! Reference lifecycle over a persist backend.

use tracing::debug;
use verso_store::{Persist, RefObj, StoreError, VersionToken};
use verso_types::ObjId;

use crate::error::{RefError, RefResult};
use crate::names::validate_ref_name;
use crate::types::{NamedRef, Reference};

/// Creates, resolves, moves and deletes references.
///
/// Holds no locks. Moves and deletes present the token of the
/// [`Reference`] the caller read; if another writer got there first the
/// operation fails with [`RefError::Conflict`] and nothing changes.
pub struct ReferenceLogic<'a> {
    persist: &'a dyn Persist,
}

impl<'a> ReferenceLogic<'a> {
    pub fn new(persist: &'a dyn Persist) -> Self {
        Self { persist }
    }

    /// Create a reference pointing at `pointer`.
    pub fn create(&self, named: &NamedRef, pointer: ObjId) -> RefResult<Reference> {
        validate_ref_name(named.short_name())?;
        self.check_pointer(pointer)?;
        let obj = RefObj::new(named.canonical_name(), pointer);
        if !self.persist.create_reference(&obj)? {
            return Err(RefError::AlreadyExists {
                name: named.to_string(),
            });
        }
        debug!(reference = %named, commit = %pointer.short_hex(), "created reference");
        Ok(Reference {
            named: named.clone(),
            pointer,
            token: obj.token,
            created_at: obj.created_at,
        })
    }

    /// Resolve a reference. The returned token is only advisory until the
    /// caller's own compare-and-swap succeeds.
    pub fn get(&self, named: &NamedRef) -> RefResult<Reference> {
        self.persist
            .fetch_reference(&named.canonical_name())?
            .and_then(Reference::from_obj)
            .ok_or_else(|| RefError::NotFound {
                name: named.to_string(),
            })
    }

    /// Move `current` to `new_pointer` if nobody moved it since it was read.
    pub fn assign(&self, current: &Reference, new_pointer: ObjId) -> RefResult<Reference> {
        self.check_pointer(new_pointer)?;
        let token = VersionToken::random();
        let name = current.named.canonical_name();
        if !self
            .persist
            .update_reference_conditional(&name, current.token, new_pointer, token)?
        {
            return Err(self.lost_race(current));
        }
        debug!(
            reference = %current.named,
            from = %current.pointer.short_hex(),
            to = %new_pointer.short_hex(),
            "assigned reference"
        );
        Ok(Reference {
            pointer: new_pointer,
            token,
            ..current.clone()
        })
    }

    /// Delete `current` if nobody moved it since it was read.
    pub fn delete(&self, current: &Reference) -> RefResult<()> {
        let name = current.named.canonical_name();
        if !self.persist.delete_reference(&name, current.token)? {
            return Err(self.lost_race(current));
        }
        debug!(reference = %current.named, "deleted reference");
        Ok(())
    }

    /// All branches and tags, sorted by canonical name.
    pub fn list(&self) -> RefResult<impl Iterator<Item = RefResult<Reference>> + 'a> {
        let persist: &'a dyn Persist = self.persist;
        let iter = persist.scan_references()?;
        Ok(iter.filter_map(|r| match r {
            Ok(obj) => Reference::from_obj(obj).map(Ok),
            Err(e) => Some(Err(e.into())),
        }))
    }

    /// Report why a compare-and-swap on `current` failed.
    fn lost_race(&self, current: &Reference) -> RefError {
        match self.get(&current.named) {
            Ok(actual) => RefError::Conflict {
                name: current.named.to_string(),
                expected: current.pointer,
                actual: actual.pointer,
            },
            Err(e) => e,
        }
    }

    fn check_pointer(&self, pointer: ObjId) -> RefResult<()> {
        if pointer.is_empty() {
            return Ok(());
        }
        match self.persist.fetch_commit(&pointer) {
            Ok(_) => Ok(()),
            Err(StoreError::NotFound(id)) => Err(RefError::CommitNotFound(id)),
            Err(e) => Err(e.into()),
        }
    }
}
