//! Generic search-and-sort pipeline shared by the attendance, participation,
//! grade, and final-grade views. Each domain supplies a haystack accessor
//! (display name + identifier) and a sort-key projection; the mechanics of
//! filtering, ordering, and direction live here once.

use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDir {
    Asc,
    Desc,
}

impl SortDir {
    /// Missing param means ascending; anything else must be one of the two
    /// literal tokens.
    pub fn parse(raw: Option<&str>) -> Option<SortDir> {
        match raw {
            None => Some(SortDir::Asc),
            Some("asc") => Some(SortDir::Asc),
            Some("desc") => Some(SortDir::Desc),
            Some(_) => None,
        }
    }
}

/// Comparable projection of a row under the selected sort key. Text keys
/// compare case-insensitively; numeric keys numerically. Categorical keys
/// are mapped to a numeric rank by the caller before reaching here.
#[derive(Debug, Clone, PartialEq)]
pub enum SortValue {
    Text(String),
    Number(f64),
}

fn cmp_values(a: &SortValue, b: &SortValue) -> Ordering {
    match (a, b) {
        (SortValue::Text(x), SortValue::Text(y)) => {
            x.to_lowercase().cmp(&y.to_lowercase())
        }
        (SortValue::Number(x), SortValue::Number(y)) => {
            x.partial_cmp(y).unwrap_or(Ordering::Equal)
        }
        // Mixed projections do not occur for a single key; keep a total
        // order anyway with text before numbers.
        (SortValue::Text(_), SortValue::Number(_)) => Ordering::Less,
        (SortValue::Number(_), SortValue::Text(_)) => Ordering::Greater,
    }
}

fn matches_search(term: &str, name: &str, ident: &str) -> bool {
    name.to_lowercase().contains(term) || ident.contains(term)
}

/// Filter by a free-text term, then stable-sort by the projected key.
/// An empty or whitespace-only term keeps every row. Returns a new vector;
/// equal keys keep their incoming relative order.
pub fn apply<T, H, K>(rows: Vec<T>, search: &str, hay: H, key: K, dir: SortDir) -> Vec<T>
where
    H: Fn(&T) -> (String, String),
    K: Fn(&T) -> SortValue,
{
    let term = search.trim().to_lowercase();
    let filtered: Vec<T> = if term.is_empty() {
        rows
    } else {
        rows.into_iter()
            .filter(|row| {
                let (name, ident) = hay(row);
                matches_search(&term, &name, &ident)
            })
            .collect()
    };

    let mut decorated: Vec<(SortValue, T)> =
        filtered.into_iter().map(|row| (key(&row), row)).collect();
    decorated.sort_by(|a, b| {
        let ord = cmp_values(&a.0, &b.0);
        match dir {
            SortDir::Asc => ord,
            SortDir::Desc => ord.reverse(),
        }
    });
    decorated.into_iter().map(|(_, row)| row).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Row {
        name: &'static str,
        ident: &'static str,
        score: f64,
    }

    fn rows() -> Vec<Row> {
        vec![
            Row { name: "Ana Lopez", ident: "101", score: 92.0 },
            Row { name: "Juan Perez", ident: "102", score: 75.5 },
            Row { name: "Marco Diaz", ident: "103", score: 75.5 },
            Row { name: "beatriz Soto", ident: "104", score: 48.0 },
        ]
    }

    fn hay(r: &Row) -> (String, String) {
        (r.name.to_string(), r.ident.to_string())
    }

    #[test]
    fn empty_term_is_identity_on_membership() {
        let sorted = apply(rows(), "   ", hay, |r| SortValue::Number(r.score), SortDir::Asc);
        assert_eq!(sorted.len(), rows().len());
        for r in rows() {
            assert!(sorted.contains(&r));
        }
    }

    #[test]
    fn search_matches_name_case_insensitively() {
        let out = apply(
            rows(),
            "an",
            hay,
            |r| SortValue::Text(r.name.to_string()),
            SortDir::Asc,
        );
        let names: Vec<&str> = out.iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["Ana Lopez", "Juan Perez"]);
    }

    #[test]
    fn search_matches_identifier_substring() {
        let out = apply(
            rows(),
            "104",
            hay,
            |r| SortValue::Text(r.name.to_string()),
            SortDir::Asc,
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name, "beatriz Soto");
    }

    #[test]
    fn text_sort_ignores_case() {
        let out = apply(
            rows(),
            "",
            hay,
            |r| SortValue::Text(r.name.to_string()),
            SortDir::Asc,
        );
        let names: Vec<&str> = out.iter().map(|r| r.name).collect();
        assert_eq!(
            names,
            vec!["Ana Lopez", "beatriz Soto", "Juan Perez", "Marco Diaz"]
        );
    }

    #[test]
    fn ascending_reversed_equals_descending() {
        let asc = apply(rows(), "", hay, |r| SortValue::Number(r.score), SortDir::Asc);
        let desc = apply(rows(), "", hay, |r| SortValue::Number(r.score), SortDir::Desc);
        let mut reversed = asc.clone();
        reversed.reverse();
        // Equal keys may land in either relative order after a reversal, so
        // compare the key sequences rather than the rows.
        let rev_scores: Vec<f64> = reversed.iter().map(|r| r.score).collect();
        let desc_scores: Vec<f64> = desc.iter().map(|r| r.score).collect();
        assert_eq!(rev_scores, desc_scores);
    }

    #[test]
    fn equal_keys_keep_incoming_order() {
        let out = apply(rows(), "", hay, |r| SortValue::Number(r.score), SortDir::Asc);
        let tied: Vec<&str> = out
            .iter()
            .filter(|r| r.score == 75.5)
            .map(|r| r.name)
            .collect();
        assert_eq!(tied, vec!["Juan Perez", "Marco Diaz"]);
    }

    #[test]
    fn direction_parse_accepts_only_known_tokens() {
        assert_eq!(SortDir::parse(None), Some(SortDir::Asc));
        assert_eq!(SortDir::parse(Some("asc")), Some(SortDir::Asc));
        assert_eq!(SortDir::parse(Some("desc")), Some(SortDir::Desc));
        assert_eq!(SortDir::parse(Some("down")), None);
    }
}
