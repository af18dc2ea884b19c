use crate::core::expression::parse_expression;
use crate::geometry::Boundary;
use crate::types::{CropError, CropResult, Image, ImageCollection, PropertyCatalog, PropertyValue};
use chrono::NaiveDate;
use std::cmp::Ordering;
use std::sync::Arc;

/// Comparison operator for attribute predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "==" => Some(Comparison::Eq),
            "!=" => Some(Comparison::Ne),
            "<" => Some(Comparison::Lt),
            "<=" => Some(Comparison::Le),
            ">" => Some(Comparison::Gt),
            ">=" => Some(Comparison::Ge),
            _ => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Comparison::Eq => "==",
            Comparison::Ne => "!=",
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
        }
    }

    fn holds(&self, ordering: Ordering) -> bool {
        match self {
            Comparison::Eq => ordering == Ordering::Equal,
            Comparison::Ne => ordering != Ordering::Equal,
            Comparison::Lt => ordering == Ordering::Less,
            Comparison::Le => ordering != Ordering::Greater,
            Comparison::Gt => ordering == Ordering::Greater,
            Comparison::Ge => ordering != Ordering::Less,
        }
    }
}

/// Per-image predicate over acquisition date, footprint or metadata
#[derive(Debug, Clone)]
pub enum Predicate {
    /// Acquisition date in `[start, end)`
    DateRange { start: NaiveDate, end: NaiveDate },
    /// Footprint intersects the boundary
    Bounds(Arc<Boundary>),
    /// Metadata property compared with a literal
    Compare {
        property: String,
        op: Comparison,
        value: PropertyValue,
    },
    /// Textual expression, parsed when the filter is applied
    Expression(String),
}

impl Predicate {
    pub fn date_range(start: NaiveDate, end: NaiveDate) -> Self {
        Predicate::DateRange { start, end }
    }

    pub fn bounds(boundary: Arc<Boundary>) -> Self {
        Predicate::Bounds(boundary)
    }

    pub fn compare(property: impl Into<String>, op: Comparison, value: impl Into<PropertyValue>) -> Self {
        Predicate::Compare {
            property: property.into(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(property: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        Self::compare(property, Comparison::Eq, value)
    }

    pub fn lt(property: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        Self::compare(property, Comparison::Lt, value)
    }

    pub fn expression(expression: impl Into<String>) -> Self {
        Predicate::Expression(expression.into())
    }
}

impl std::fmt::Display for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Predicate::DateRange { start, end } => write!(f, "date in [{}, {})", start, end),
            Predicate::Bounds(boundary) => write!(f, "bounds({})", boundary.name()),
            Predicate::Compare { property, op, value } => {
                write!(f, "{} {} {}", property, op.symbol(), value)
            }
            Predicate::Expression(expression) => write!(f, "{}", expression),
        }
    }
}

/// Predicate after parsing and validation
#[derive(Debug, Clone)]
enum CompiledPredicate {
    DateRange { start: NaiveDate, end: NaiveDate },
    Bounds(Arc<Boundary>),
    Compare {
        property: String,
        op: Comparison,
        value: PropertyValue,
    },
}

impl CompiledPredicate {
    /// Kinds were checked against the catalog when compiling, so a value
    /// that still cannot be ordered (NaN, unparseable date text) just fails
    /// to match
    fn matches(&self, image: &Image) -> bool {
        match self {
            CompiledPredicate::DateRange { start, end } => image
                .acquired()
                .map(|date| date >= *start && date < *end)
                .unwrap_or(false),
            CompiledPredicate::Bounds(boundary) => boundary.intersects(image.footprint()),
            CompiledPredicate::Compare { property, op, value } => image
                .property(property)
                .and_then(|actual| actual.compare(value))
                .map(|ordering| op.holds(ordering))
                .unwrap_or(false),
        }
    }
}

/// Narrows a collection to the images satisfying every predicate.
///
/// Predicates are pure per-image tests combined as a conjunction, so the
/// result (images and their relative order) does not depend on the order
/// predicates are given in.
#[derive(Debug, Clone, Default)]
pub struct CollectionFilter {
    predicates: Vec<Predicate>,
}

impl CollectionFilter {
    pub fn new(predicates: Vec<Predicate>) -> Self {
        Self { predicates }
    }

    pub fn with(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Apply all predicates; an empty result is not an error
    pub fn apply(&self, collection: &ImageCollection) -> CropResult<ImageCollection> {
        let compiled = self.compile(collection)?;
        let filtered =
            collection.retain_by(|image| compiled.iter().all(|predicate| predicate.matches(image)));

        log::debug!(
            "Filter [{}] kept {} of {} images",
            self.describe(),
            filtered.len(),
            collection.len()
        );
        Ok(filtered)
    }

    pub fn describe(&self) -> String {
        self.predicates
            .iter()
            .map(|predicate| predicate.to_string())
            .collect::<Vec<_>>()
            .join(" && ")
    }

    fn compile(&self, collection: &ImageCollection) -> CropResult<Vec<CompiledPredicate>> {
        let mut compiled = Vec::with_capacity(self.predicates.len());
        for predicate in &self.predicates {
            match predicate {
                Predicate::DateRange { start, end } => {
                    if end < start {
                        return Err(CropError::InvalidDateRange {
                            start: *start,
                            end: *end,
                        });
                    }
                    compiled.push(CompiledPredicate::DateRange {
                        start: *start,
                        end: *end,
                    });
                }
                Predicate::Bounds(boundary) => {
                    compiled.push(CompiledPredicate::Bounds(Arc::clone(boundary)));
                }
                Predicate::Compare { property, op, value } => {
                    compiled.push(CompiledPredicate::Compare {
                        property: property.clone(),
                        op: *op,
                        value: value.clone(),
                    });
                }
                Predicate::Expression(expression) => {
                    for clause in parse_expression(expression)? {
                        compiled.push(CompiledPredicate::Compare {
                            property: clause.property,
                            op: clause.op,
                            value: clause.value,
                        });
                    }
                }
            }
        }

        if let Some(catalog) = collection.catalog() {
            check_against_catalog(&compiled, catalog)?;
        }
        Ok(compiled)
    }
}

/// Property checks made once per filter, before any image is tested.
///
/// The catalog describes every image the collection descends from, so the
/// outcome depends neither on predicate order nor on what earlier filters
/// removed. A property no image carried is a caller mistake, not an empty
/// match; so is a literal no carried kind can be compared with.
fn check_against_catalog(compiled: &[CompiledPredicate], catalog: &PropertyCatalog) -> CropResult<()> {
    for predicate in compiled {
        if let CompiledPredicate::Compare { property, value, .. } = predicate {
            let kinds = catalog
                .get(property)
                .ok_or_else(|| CropError::UnknownProperty(property.clone()))?;
            if let Some(kind) = kinds.iter().find(|kind| !kind.accepts(value)) {
                return Err(CropError::TypeMismatch {
                    property: property.clone(),
                    expected: value.type_name().to_string(),
                    found: kind.name().to_string(),
                });
            }
        }
    }
    Ok(())
}
