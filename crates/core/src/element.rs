//! Assay element channels
//!
//! The set of elements is closed: every identifier coming from outside the
//! crate is parsed into an [`Element`] before any store access, and storage
//! columns come from a fixed lookup table rather than string building.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A recognized assay grade channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Element {
    #[serde(rename = "au_ppm")]
    Gold,
    #[serde(rename = "ag_ppm")]
    Silver,
    #[serde(rename = "cu_ppm")]
    Copper,
    #[serde(rename = "pb_ppm")]
    Lead,
    #[serde(rename = "zn_ppm")]
    Zinc,
}

/// Static metadata for one element.
#[derive(Debug, Clone, Copy)]
struct ElementInfo {
    id: &'static str,
    name: &'static str,
    unit: &'static str,
    grade_column: &'static str,
}

const ELEMENT_TABLE: [ElementInfo; Element::COUNT] = [
    ElementInfo { id: "au_ppm", name: "Gold (Au)", unit: "ppm", grade_column: "au_grade" },
    ElementInfo { id: "ag_ppm", name: "Silver (Ag)", unit: "ppm", grade_column: "ag_grade" },
    ElementInfo { id: "cu_ppm", name: "Copper (Cu)", unit: "ppm", grade_column: "cu_grade" },
    ElementInfo { id: "pb_ppm", name: "Lead (Pb)", unit: "ppm", grade_column: "pb_grade" },
    ElementInfo { id: "zn_ppm", name: "Zinc (Zn)", unit: "ppm", grade_column: "zn_grade" },
];

impl Element {
    /// Number of element channels.
    pub const COUNT: usize = 5;

    /// All elements in canonical order.
    pub const ALL: [Element; Element::COUNT] = [
        Element::Gold,
        Element::Silver,
        Element::Copper,
        Element::Lead,
        Element::Zinc,
    ];

    /// Dense index in `0..COUNT`, used for per-element slots.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    fn info(self) -> &'static ElementInfo {
        &ELEMENT_TABLE[self.index()]
    }

    /// Assay identifier, e.g. `au_ppm`.
    pub fn id(self) -> &'static str {
        self.info().id
    }

    /// Human readable name, e.g. `Gold (Au)`.
    pub fn name(self) -> &'static str {
        self.info().name
    }

    /// Measurement unit of the assay channel.
    pub fn unit(self) -> &'static str {
        self.info().unit
    }

    /// Block-model column holding the estimated grade for this element.
    pub fn grade_column(self) -> &'static str {
        self.info().grade_column
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Element {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Element::ALL
            .into_iter()
            .find(|e| e.id() == s)
            .ok_or_else(|| Error::UnknownElement(s.to_string()))
    }
}

/// Fixed-size storage with one optional slot per element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElementSlots<T>([Option<T>; Element::COUNT]);

impl<T> Default for ElementSlots<T> {
    fn default() -> Self {
        Self([None, None, None, None, None])
    }
}

impl<T> ElementSlots<T> {
    pub fn get(&self, element: Element) -> Option<&T> {
        self.0[element.index()].as_ref()
    }

    pub fn set(&mut self, element: Element, value: Option<T>) {
        self.0[element.index()] = value;
    }

    pub fn is_set(&self, element: Element) -> bool {
        self.0[element.index()].is_some()
    }

    /// Iterate over the populated slots.
    pub fn iter(&self) -> impl Iterator<Item = (Element, &T)> {
        Element::ALL
            .into_iter()
            .zip(self.0.iter())
            .filter_map(|(e, v)| v.as_ref().map(|v| (e, v)))
    }
}
