//! Thread-local cache of compiled path expressions.
//!
//! Patch sets tend to reuse the same handful of queries across many
//! operations. The cache is capped at 256 entries and cleared when full.

use crate::query::errors::QueryError;
use crate::query::path::PathExpr;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

const MAX_CACHE_ENTRIES: usize = 256;

thread_local! {
    static PATH_CACHE: RefCell<HashMap<String, Rc<PathExpr>>> = RefCell::new(HashMap::new());
}

/// Get a compiled expression from cache, or parse and cache it.
///
/// Parse failures are not cached.
pub fn get_or_compile(query: &str) -> Result<Rc<PathExpr>, QueryError> {
    PATH_CACHE.with(|cache| {
        let mut cache = cache.borrow_mut();

        if let Some(expr) = cache.get(query) {
            return Ok(Rc::clone(expr));
        }

        if cache.len() >= MAX_CACHE_ENTRIES {
            cache.clear();
        }

        let compiled = Rc::new(PathExpr::parse(query)?);
        cache.insert(query.to_string(), Rc::clone(&compiled));
        Ok(compiled)
    })
}

/// Clear the cache (mainly for testing).
pub fn clear_cache() {
    PATH_CACHE.with(|cache| cache.borrow_mut().clear());
}

pub fn cache_size() -> usize {
    PATH_CACHE.with(|cache| cache.borrow().len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caches_successful_compilations_only() {
        clear_cache();
        let first = get_or_compile("/Defs/ThingDef").unwrap();
        let second = get_or_compile("/Defs/ThingDef").unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        assert!(get_or_compile("/Defs/[").is_err());
        assert_eq!(cache_size(), 1);
    }
}
