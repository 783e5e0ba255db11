//! Catalog query engine: extras parsing, genre/year filtering, pagination,
//! and resolve/reorder passes over a catalog listing.
//!
//! All functions here are pure over their inputs; the service layer wires
//! them to the store and the gateway.

pub mod tree;

use std::collections::HashMap;

use thiserror::Error;

use crate::model::{CatalogItem, MetaRecord};
use crate::store::CatalogStore;

/// Fixed pagination window applied after filtering.
pub const PAGE_SIZE: usize = 25;

/// Errors from parsing the catalog `extras` string. These are client
/// errors; the HTTP layer maps them to 400.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtrasError {
    #[error("invalid skip value: {0:?}")]
    InvalidSkip(String),
}

/// Parsed catalog query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedExtras {
    pub genre: Option<String>,
    pub skip: usize,
}

/// Parse the ampersand-delimited `extras` suffix.
///
/// A literal `" & "` inside a value is escaped as `$` before splitting and
/// restored afterward, so genre names like `"Sci & Fi"` survive. Tokens
/// without a value part are ignored. A non-numeric `skip` fails explicitly
/// rather than defaulting.
pub fn parse_extras(extras: Option<&str>) -> Result<ParsedExtras, ExtrasError> {
    let mut result = ParsedExtras::default();

    let Some(extras) = extras else {
        return Ok(result);
    };

    let escaped = extras.replace(" & ", "$");
    for token in escaped.split('&') {
        let Some((key, value)) = token.split_once('=') else {
            continue;
        };
        match key {
            "genre" => result.genre = Some(value.replace('$', " & ")),
            "skip" => {
                result.skip = value
                    .parse()
                    .map_err(|_| ExtrasError::InvalidSkip(value.to_string()))?;
            }
            _ => {}
        }
    }

    Ok(result)
}

/// Filter `items` by genre (or by year when `genre` is purely numeric),
/// then apply the pagination window of [`PAGE_SIZE`] starting at `skip`,
/// clamped to the filtered length.
///
/// `genre` is expected to already be simplified by the caller when an
/// external genre lookup applies.
pub fn filter_items(items: &[CatalogItem], genre: Option<&str>, skip: usize) -> Vec<CatalogItem> {
    let filtered: Vec<&CatalogItem> = match genre {
        Some(genre) => {
            if let Ok(year) = genre.parse::<u16>() {
                items.iter().filter(|i| i.year == Some(year)).collect()
            } else {
                items
                    .iter()
                    .filter(|i| i.genres.iter().any(|g| g == genre))
                    .collect()
            }
        }
        None => items.iter().collect(),
    };

    let start = skip.min(filtered.len());
    let end = skip.saturating_add(PAGE_SIZE).min(filtered.len());
    filtered[start..end].iter().map(|i| (*i).clone()).collect()
}

/// Split `items` into records already cached in `store` and the ids that
/// still need external resolution. The order of the returned records is not
/// guaranteed at this stage; [`reorder_metas`] restores it.
pub fn resolve_metas(
    items: &[CatalogItem],
    store: &CatalogStore,
) -> (Vec<MetaRecord>, Vec<String>) {
    let ids: Vec<String> = items.iter().map(|i| i.id.clone()).collect();
    let cached = store.get_metas(&ids);

    let mut resolved = Vec::with_capacity(cached.len());
    let mut missing = Vec::new();
    for item in items {
        match cached.get(&item.id) {
            Some(meta) => resolved.push(meta.clone()),
            None => missing.push(item.id.clone()),
        }
    }
    (resolved, missing)
}

/// Re-sort `metas` to exactly match the order of `items`, dropping any item
/// whose record still cannot be found. Each id appears at most once in the
/// output.
pub fn reorder_metas(metas: Vec<MetaRecord>, items: &[CatalogItem]) -> Vec<MetaRecord> {
    let mut by_id: HashMap<String, MetaRecord> =
        metas.into_iter().map(|m| (m.id.clone(), m)).collect();

    items
        .iter()
        .filter_map(|item| by_id.remove(&item.id))
        .collect()
}
