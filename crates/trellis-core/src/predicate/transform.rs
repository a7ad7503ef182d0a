use super::ElementTuple;
use crate::types::{Element, TrellisError, Value};
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// Built-in transform functions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "class", rename_all_fields = "camelCase")]
pub enum Function {
    Identity,
    /// Joins two values; a missing side yields the other unchanged.
    Concat {
        #[serde(default = "default_separator")]
        separator: String,
    },
    /// Length of a text or list value.
    Length,
    ToUpperCase,
}

fn default_separator() -> String {
    ",".to_string()
}

impl Function {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Function::Identity => "Identity",
            Function::Concat { .. } => "Concat",
            Function::Length => "Length",
            Function::ToUpperCase => "ToUpperCase",
        }
    }

    #[must_use]
    pub fn arity(&self) -> usize {
        match self {
            Function::Concat { .. } => 2,
            _ => 1,
        }
    }

    /// Apply to a tuple whose arity has already been checked.
    #[must_use]
    pub fn apply(&self, tuple: &[Option<&Value>]) -> Option<Value> {
        let first = tuple.first().copied().flatten();
        match self {
            Function::Identity => first.cloned(),
            Function::Concat { separator } => {
                let second = tuple.get(1).copied().flatten();
                match (first, second) {
                    (Some(a), Some(b)) => Some(Value::Text(format!("{}{}{}", a, separator, b))),
                    (Some(v), None) | (None, Some(v)) => Some(v.clone()),
                    (None, None) => None,
                }
            }
            Function::Length => first.and_then(Value::len).map(|len| Value::Int(len as i64)),
            Function::ToUpperCase => first
                .and_then(Value::as_text)
                .map(|s| Value::Text(s.to_uppercase())),
        }
    }
}

/// One transformer component: selection, function and projected property.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TupleAdaptedFunction {
    pub selection: Vec<String>,
    pub function: Function,
    pub projection: String,
}

/// Ordered functions whose results are written back as properties.
///
/// A function that yields nothing removes the projected property. Locking
/// works as for [`ElementFilter`](super::ElementFilter); equality and
/// hashing cover the components only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementTransformer {
    components: Vec<TupleAdaptedFunction>,
    #[serde(skip)]
    locked: bool,
}

impl ElementTransformer {
    #[must_use]
    pub fn builder() -> ElementTransformerBuilder {
        ElementTransformerBuilder {
            transformer: Self::default(),
        }
    }

    #[must_use]
    pub fn components(&self) -> &[TupleAdaptedFunction] {
        &self.components
    }

    pub fn components_mut(&mut self) -> Result<&mut Vec<TupleAdaptedFunction>, TrellisError> {
        if self.locked {
            return Err(TrellisError::Immutable("element transformer"));
        }
        Ok(&mut self.components)
    }

    pub fn add_component(&mut self, component: TupleAdaptedFunction) -> Result<(), TrellisError> {
        self.components_mut()?.push(component);
        Ok(())
    }

    pub fn lock(&mut self) {
        self.locked = true;
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn validate(&self) -> Result<(), TrellisError> {
        for c in &self.components {
            let expected = c.function.arity();
            if c.selection.len() != expected {
                return Err(TrellisError::ArityMismatch {
                    selection: c.selection.clone(),
                    function: c.function.name().to_string(),
                    expected,
                    actual: c.selection.len(),
                });
            }
        }
        Ok(())
    }

    /// Apply every component in order. Later components see earlier results.
    pub fn apply(&self, element: &mut Element) -> Result<(), TrellisError> {
        self.validate()?;
        for c in &self.components {
            let output = {
                let tuple = ElementTuple::new(element);
                let values = tuple.select(&c.selection);
                let refs: Vec<Option<&Value>> = values.iter().map(|v| v.as_deref()).collect();
                c.function.apply(&refs)
            };
            let properties = element.properties_mut();
            match output {
                Some(value) => {
                    properties.insert(c.projection.clone(), value);
                }
                None => {
                    properties.remove(&c.projection);
                }
            }
        }
        Ok(())
    }
}

impl PartialEq for ElementTransformer {
    fn eq(&self, other: &Self) -> bool {
        self.components == other.components
    }
}

impl Eq for ElementTransformer {}

impl Hash for ElementTransformer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.components.hash(state);
    }
}

/// Builds an [`ElementTransformer`] from `select(..).execute(..).project(..)`.
#[derive(Debug)]
pub struct ElementTransformerBuilder {
    transformer: ElementTransformer,
}

impl ElementTransformerBuilder {
    #[must_use]
    pub fn select<I, S>(self, selection: I) -> SelectedTransformerBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        SelectedTransformerBuilder {
            transformer: self.transformer,
            selection: selection.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn build(self) -> ElementTransformer {
        self.transformer
    }
}

#[derive(Debug)]
pub struct SelectedTransformerBuilder {
    transformer: ElementTransformer,
    selection: Vec<String>,
}

impl SelectedTransformerBuilder {
    #[must_use]
    pub fn execute(self, function: Function) -> ProjectingTransformerBuilder {
        ProjectingTransformerBuilder {
            transformer: self.transformer,
            selection: self.selection,
            function,
        }
    }
}

#[derive(Debug)]
pub struct ProjectingTransformerBuilder {
    transformer: ElementTransformer,
    selection: Vec<String>,
    function: Function,
}

impl ProjectingTransformerBuilder {
    #[must_use]
    pub fn project(mut self, projection: impl Into<String>) -> ElementTransformerBuilder {
        self.transformer.components.push(TupleAdaptedFunction {
            selection: self.selection,
            function: self.function,
            projection: projection.into(),
        });
        ElementTransformerBuilder {
            transformer: self.transformer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Edge;

    #[test]
    fn transformer_projects_in_order() {
        let transformer = ElementTransformer::builder()
            .select(["SOURCE", "DESTINATION"])
            .execute(Function::Concat {
                separator: "->".to_string(),
            })
            .project("route")
            .select(["route"])
            .execute(Function::Length)
            .project("routeLength")
            .build();

        let mut element = Element::from(Edge::new("road", "A", "B", true));
        transformer.apply(&mut element).expect("apply");

        assert_eq!(element.property("route"), Some(&Value::from("A->B")));
        assert_eq!(element.property("routeLength"), Some(&Value::Int(4)));
    }

    #[test]
    fn empty_output_removes_projection() {
        let transformer = ElementTransformer::builder()
            .select(["missing"])
            .execute(Function::ToUpperCase)
            .project("name")
            .build();
        let mut element = Element::from(Edge::new("road", "A", "B", true).with_property("name", "x"));
        transformer.apply(&mut element).expect("apply");
        assert_eq!(element.property("name"), None);
    }

    #[test]
    fn locked_transformer_rejects_new_components() {
        let mut transformer = ElementTransformer::builder()
            .select(["name"])
            .execute(Function::ToUpperCase)
            .project("name")
            .build();
        let extra = TupleAdaptedFunction {
            selection: vec!["name".to_string()],
            function: Function::Length,
            projection: "nameLength".to_string(),
        };
        transformer.add_component(extra.clone()).expect("unlocked");
        let before = transformer.clone();

        transformer.lock();
        assert!(transformer.is_locked());
        assert!(matches!(
            transformer.add_component(extra),
            Err(TrellisError::Immutable(_))
        ));
        assert_eq!(transformer, before);
        assert_eq!(transformer.components().len(), 2);
    }

    #[test]
    fn arity_mismatch_is_reported() {
        let transformer = ElementTransformer::builder()
            .select(["a"])
            .execute(Function::Concat {
                separator: ",".to_string(),
            })
            .project("b")
            .build();
        let mut element = Element::from(Edge::new("road", "A", "B", true));
        assert!(matches!(
            transformer.apply(&mut element),
            Err(TrellisError::ArityMismatch { expected: 2, actual: 1, .. })
        ));
    }
}
