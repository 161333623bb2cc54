//! Division lookup table
//!
//! Built from the `[[divisions]]` config section once per run and injected into
//! the resolver. Provides the broadened division order used by tier C.

use serde::Deserialize;
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::models::Gender;

/// One competition division
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Division {
    pub code: String,
    pub gender: Gender,
    /// Age class label ("open", "junior", "m1", ...)
    pub age_class: String,
    /// Upper weight limit in kg; None for unlimited classes
    #[serde(default)]
    pub weight_class: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct DivisionCatalog {
    divisions: Vec<Division>,
    by_code: HashMap<String, usize>,
}

impl DivisionCatalog {
    pub fn new(divisions: Vec<Division>) -> Self {
        let by_code = divisions
            .iter()
            .enumerate()
            .map(|(i, d)| (d.code.clone(), i))
            .collect();
        Self { divisions, by_code }
    }

    pub fn lookup(&self, code: &str) -> Option<&Division> {
        self.by_code.get(code).map(|i| &self.divisions[*i])
    }

    pub fn len(&self) -> usize {
        self.divisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.divisions.is_empty()
    }

    /// Division codes to search, most likely first
    ///
    /// 1. same gender and age class, nearest weight first (the original leads)
    /// 2. same gender, other age class, weight within `weight_proximity_kg`
    /// 3. any other same-gender division
    /// 4. opposite gender
    ///
    /// Within a group, ties break on weight distance then code. An unknown
    /// code yields just itself. At most `max` codes are returned.
    pub fn broadened_order(&self, code: &str, weight_proximity_kg: f64, max: usize) -> Vec<String> {
        let Some(origin) = self.lookup(code) else {
            return vec![code.to_string()];
        };

        let distance = |d: &Division| match (origin.weight_class, d.weight_class) {
            (Some(a), Some(b)) => (a - b).abs(),
            (None, None) => 0.0,
            _ => f64::INFINITY,
        };

        let mut groups: [Vec<(&Division, f64)>; 4] = Default::default();
        for division in &self.divisions {
            if division.code == origin.code {
                continue;
            }
            let dist = distance(division);
            let group = if division.gender != origin.gender {
                3
            } else if division.age_class == origin.age_class {
                0
            } else if dist <= weight_proximity_kg {
                1
            } else {
                2
            };
            groups[group].push((division, dist));
        }

        let mut order = vec![origin.code.clone()];
        for mut group in groups {
            group.sort_by(|(a, da), (b, db)| {
                da.partial_cmp(db)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| a.code.cmp(&b.code))
            });
            order.extend(group.into_iter().map(|(d, _)| d.code.clone()));
        }

        order.truncate(max.max(1));
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn division(code: &str, gender: Gender, age: &str, weight: Option<f64>) -> Division {
        Division {
            code: code.to_string(),
            gender,
            age_class: age.to_string(),
            weight_class: weight,
        }
    }

    fn catalog() -> DivisionCatalog {
        DivisionCatalog::new(vec![
            division("M-OPEN-105", Gender::Male, "open", Some(105.0)),
            division("M-OPEN-83", Gender::Male, "open", Some(83.0)),
            division("M-OPEN-93", Gender::Male, "open", Some(93.0)),
            division("M-JR-93", Gender::Male, "junior", Some(93.0)),
            division("M-JR-66", Gender::Male, "junior", Some(66.0)),
            division("F-OPEN-84", Gender::Female, "open", Some(84.0)),
        ])
    }

    #[test]
    fn test_broadened_order_groups() {
        let order = catalog().broadened_order("M-OPEN-93", 10.0, 20);
        assert_eq!(
            order,
            vec!["M-OPEN-93", "M-OPEN-83", "M-OPEN-105", "M-JR-93", "M-JR-66", "F-OPEN-84"]
        );
    }

    #[test]
    fn test_broadened_order_truncated() {
        let order = catalog().broadened_order("M-OPEN-93", 10.0, 2);
        assert_eq!(order, vec!["M-OPEN-93", "M-OPEN-83"]);
    }

    #[test]
    fn test_unknown_code_only_itself() {
        assert_eq!(
            catalog().broadened_order("X-99", 10.0, 5),
            vec!["X-99".to_string()]
        );
    }
}
