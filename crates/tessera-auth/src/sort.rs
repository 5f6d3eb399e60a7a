//! Sort parameter parsing.
//!
//! List endpoints accept `sort=field[,asc|desc]`. The field is checked
//! against the entity's known fields; an unknown field is rejected with
//! suggestions drawn from the known fields by edit distance.

use std::cmp::Ordering;

use crate::error::{AuthError, AuthResult};

/// Maximum edit distance for a known field to be suggested.
const MAX_SUGGESTION_DISTANCE: usize = 3;

/// An entity that list endpoints can sort.
pub trait Sortable {
    /// Field names accepted in a sort parameter.
    const FIELDS: &'static [&'static str];

    /// Compares two values by one of [`Self::FIELDS`].
    fn compare_by(&self, other: &Self, field: &str) -> Ordering;
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

/// A parsed, validated sort parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    /// A member of the entity's field list.
    pub field: &'static str,
    /// Direction.
    pub direction: SortDirection,
}

impl SortSpec {
    /// Parses `field[,asc|desc]` for entity `T`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::UnknownField` if the field is not one of
    /// `T::FIELDS`, and a field-level validation error for a bad direction.
    pub fn parse<T: Sortable>(raw: &str) -> AuthResult<Self> {
        let (field, direction) = match raw.split_once(',') {
            Some((field, direction)) => (field.trim(), direction.trim()),
            None => (raw.trim(), ""),
        };

        let direction = match direction.to_ascii_lowercase().as_str() {
            "" | "asc" => SortDirection::Asc,
            "desc" => SortDirection::Desc,
            other => {
                return Err(AuthError::invalid_field(
                    "sort",
                    "sort.direction.invalid",
                    format!("Sort direction must be 'asc' or 'desc', got '{}'", other),
                ));
            }
        };

        let field = T::FIELDS
            .iter()
            .copied()
            .find(|known| *known == field)
            .ok_or_else(|| AuthError::unknown_field(field, suggest(field, T::FIELDS)))?;

        Ok(Self { field, direction })
    }

    /// Parses an optional sort parameter.
    ///
    /// # Errors
    ///
    /// See [`SortSpec::parse`].
    pub fn parse_optional<T: Sortable>(raw: Option<&str>) -> AuthResult<Option<Self>> {
        raw.filter(|s| !s.trim().is_empty())
            .map(Self::parse::<T>)
            .transpose()
    }

    /// Sorts `items` in place. The sort is stable.
    pub fn apply<T: Sortable>(&self, items: &mut [T]) {
        items.sort_by(|a, b| {
            let ordering = a.compare_by(b, self.field);
            match self.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });
    }
}

/// Returns known fields close to `field`, nearest first.
///
/// A field is close when it is within [`MAX_SUGGESTION_DISTANCE`] edits
/// (case-insensitive) or one name is a prefix of the other.
#[must_use]
pub fn suggest(field: &str, known: &[&str]) -> Vec<String> {
    let needle = field.to_lowercase();
    let mut scored: Vec<(usize, &str)> = known
        .iter()
        .filter_map(|candidate| {
            let lower = candidate.to_lowercase();
            let distance = levenshtein(&needle, &lower);
            let prefix = !needle.is_empty()
                && (lower.starts_with(&needle) || needle.starts_with(&lower));
            (distance <= MAX_SUGGESTION_DISTANCE || prefix).then_some((distance, *candidate))
        })
        .collect();
    scored.sort();
    scored.into_iter().map(|(_, c)| c.to_string()).collect()
}

/// Edit distance between two strings, counted in chars.
fn levenshtein(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.chars().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != *cb);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}
