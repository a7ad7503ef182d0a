use super::{
    AddElements, Count, CountGroups, CustomOperation, DiscardOutput, ExportToSet, GetAdjacentIds,
    GetAllElements, GetElements, GetSetExport, Limit, Operation, OperationChain, OperationKind,
    SplitStore, ToArray, ToEntitySeeds, ToSet, Validate,
};
use crate::types::TrellisError;
use serde::de::DeserializeOwned;
use serde_json::Value as Json;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Builds a custom operation from its JSON document.
pub type CustomOperationFactory =
    Arc<dyn Fn(&Json) -> Result<Box<dyn CustomOperation>, TrellisError> + Send + Sync>;

type Factory = Arc<dyn Fn(&Json) -> Result<Operation, TrellisError> + Send + Sync>;

/// Discriminator table from `"class"` names to operation factories.
///
/// Built-in kinds are always present. Names may be qualified with a
/// dotted prefix (`a.b.GetElements`); only the last segment is looked up.
#[derive(Clone)]
pub struct OperationRegistry {
    factories: BTreeMap<String, (OperationKind, Factory)>,
}

fn built_in<T>(wrap: fn(T) -> Operation) -> Factory
where
    T: DeserializeOwned + 'static,
{
    Arc::new(move |json: &Json| Ok(wrap(T::deserialize(json)?)))
}

impl Default for OperationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationRegistry {
    #[must_use]
    pub fn new() -> Self {
        let entries: [(OperationKind, Factory); 15] = [
            (OperationKind::AddElements, built_in::<AddElements>(Operation::AddElements)),
            (OperationKind::GetElements, built_in::<GetElements>(Operation::GetElements)),
            (OperationKind::GetAllElements, built_in::<GetAllElements>(Operation::GetAllElements)),
            (OperationKind::GetAdjacentIds, built_in::<GetAdjacentIds>(Operation::GetAdjacentIds)),
            (OperationKind::Validate, built_in::<Validate>(Operation::Validate)),
            (OperationKind::Count, built_in::<Count>(Operation::Count)),
            (OperationKind::CountGroups, built_in::<CountGroups>(Operation::CountGroups)),
            (OperationKind::Limit, built_in::<Limit>(Operation::Limit)),
            (OperationKind::ToSet, built_in::<ToSet>(Operation::ToSet)),
            (OperationKind::ToEntitySeeds, built_in::<ToEntitySeeds>(Operation::ToEntitySeeds)),
            (OperationKind::DiscardOutput, built_in::<DiscardOutput>(Operation::DiscardOutput)),
            (OperationKind::SplitStore, built_in::<SplitStore>(Operation::SplitStore)),
            (OperationKind::ExportToSet, built_in::<ExportToSet>(Operation::ExportToSet)),
            (OperationKind::GetSetExport, built_in::<GetSetExport>(Operation::GetSetExport)),
            (OperationKind::ToArray, built_in::<ToArray>(Operation::ToArray)),
        ];
        let factories = entries
            .into_iter()
            .map(|(kind, factory)| (kind.name().to_string(), (kind, factory)))
            .collect();
        Self { factories }
    }

    /// Register a custom kind under `name`. Built-in names cannot be replaced.
    pub fn register_custom<F>(&mut self, name: impl Into<String>, factory: F) -> Result<(), TrellisError>
    where
        F: Fn(&Json) -> Result<Box<dyn CustomOperation>, TrellisError> + Send + Sync + 'static,
    {
        let name = name.into();
        if name.is_empty() {
            return Err(TrellisError::Construction(
                "Custom operation name must not be empty".to_string(),
            ));
        }
        if let Some((kind, _)) = self.factories.get(&name) {
            if !matches!(kind, OperationKind::Custom(_)) {
                return Err(TrellisError::Construction(format!(
                    "Cannot replace built-in operation {}",
                    name
                )));
            }
        }
        let factory: CustomOperationFactory = Arc::new(factory);
        let wrapped: Factory = Arc::new(move |json: &Json| Ok(Operation::Custom(factory(json)?)));
        self.factories
            .insert(name.clone(), (OperationKind::Custom(name), wrapped));
        Ok(())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Resolve a class name to its kind.
    pub fn resolve_kind(&self, class: &str) -> Result<OperationKind, TrellisError> {
        let name = class.rsplit('.').next().unwrap_or(class).trim();
        if name.is_empty() {
            return Err(TrellisError::Construction(
                "Operation class must not be empty".to_string(),
            ));
        }
        self.factories
            .get(name)
            .map(|(kind, _)| kind.clone())
            .ok_or_else(|| TrellisError::Construction(format!("Unknown operation class: {}", class)))
    }

    /// Build one operation from a JSON object carrying a `"class"` field.
    pub fn parse_operation(&self, json: &Json) -> Result<Operation, TrellisError> {
        let class = match json.get("class") {
            None | Some(Json::Null) => {
                return Err(TrellisError::Construction(
                    "Operation class is missing".to_string(),
                ));
            }
            Some(Json::String(class)) => class,
            Some(other) => {
                return Err(TrellisError::Construction(format!(
                    "Operation class must be a string, got {}",
                    other
                )));
            }
        };
        let kind = self.resolve_kind(class)?;
        let (_, factory) = self
            .factories
            .get(kind.name())
            .ok_or_else(|| TrellisError::Construction(format!("Unknown operation class: {}", class)))?;
        factory(json).map_err(|e| match e {
            TrellisError::Serialization(msg) => {
                TrellisError::Construction(format!("Invalid {} operation: {}", kind, msg))
            }
            other => other,
        })
    }

    /// Parse a chain document.
    ///
    /// Accepts `{"operations": [..]}`, a bare array of operations, or a
    /// single operation object.
    pub fn parse_chain(&self, bytes: &[u8]) -> Result<OperationChain, TrellisError> {
        let json: Json = serde_json::from_slice(bytes)?;
        let items = match &json {
            Json::Array(items) => items.as_slice(),
            Json::Object(map) if map.contains_key("operations") && !map.contains_key("class") => {
                match map.get("operations") {
                    Some(Json::Array(items)) => items.as_slice(),
                    _ => {
                        return Err(TrellisError::Construction(
                            "Chain operations must be an array".to_string(),
                        ));
                    }
                }
            }
            Json::Object(_) => std::slice::from_ref(&json),
            _ => {
                return Err(TrellisError::Construction(
                    "Chain must be an object or an array".to_string(),
                ));
            }
        };
        let operations = items
            .iter()
            .map(|item| self.parse_operation(item))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(OperationChain::new(operations))
    }
}

impl fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationRegistry")
            .field("names", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::View;
    use crate::operation::DEFAULT_EXPORT_KEY;
    use serde_json::json;

    #[derive(Debug, Clone)]
    struct Publish {
        #[allow(dead_code)] // read via Debug output in tests
        target: String,
    }

    impl CustomOperation for Publish {
        fn kind_name(&self) -> &str {
            "Publish"
        }

        fn clone_box(&self) -> Box<dyn CustomOperation> {
            Box::new(self.clone())
        }
    }

    #[test]
    fn built_in_operations_parse() {
        let registry = OperationRegistry::new();
        let op = registry
            .parse_operation(&json!({
                "class": "GetElements",
                "input": [{"vertex": "a"}, {"source": "a", "destination": "b", "directedType": "DIRECTED"}],
                "view": {"entities": {"person": {}}}
            }))
            .expect("parse");
        let Operation::GetElements(get) = op else {
            return;
        };
        assert_eq!(get.input.len(), 2);
        assert_eq!(get.view, Some(View::new().with_entity("person", Default::default())));
    }

    #[test]
    fn qualified_class_names_resolve() {
        let registry = OperationRegistry::new();
        assert_eq!(
            registry.resolve_kind("org.graph.operation.Limit").expect("kind"),
            OperationKind::Limit
        );
    }

    #[test]
    fn missing_empty_and_unknown_classes_fail() {
        let registry = OperationRegistry::new();
        for doc in [
            json!({}),
            json!({"class": null}),
            json!({"class": ""}),
            json!({"class": "   "}),
            json!({"class": "NotAnOperation"}),
            json!({"class": 3}),
        ] {
            assert!(
                matches!(
                    registry.parse_operation(&doc),
                    Err(TrellisError::Construction(_))
                ),
                "{doc} should fail"
            );
        }
    }

    #[test]
    fn bad_fields_are_construction_errors() {
        let registry = OperationRegistry::new();
        let result = registry.parse_operation(&json!({"class": "Limit", "resultLimit": "ten"}));
        assert!(matches!(result, Err(TrellisError::Construction(_))));
    }

    #[test]
    fn custom_kinds_register() {
        let mut registry = OperationRegistry::new();
        registry
            .register_custom("Publish", |json| {
                let target = json
                    .get("target")
                    .and_then(Json::as_str)
                    .unwrap_or("stdout")
                    .to_string();
                Ok(Box::new(Publish { target }))
            })
            .expect("register");

        let op = registry
            .parse_operation(&json!({"class": "Publish", "target": "file"}))
            .expect("parse");
        assert_eq!(op.kind(), OperationKind::Custom("Publish".to_string()));
        let Operation::Custom(custom) = op else {
            return;
        };
        assert!(format!("{:?}", custom).contains("target: \"file\""));
    }

    #[test]
    fn built_ins_cannot_be_replaced() {
        let mut registry = OperationRegistry::new();
        let result = registry.register_custom("Count", |_| {
            Ok(Box::new(Publish {
                target: String::new(),
            }))
        });
        assert!(result.is_err());
    }

    #[test]
    fn set_export_operations_parse() {
        let registry = OperationRegistry::new();
        let chain = registry
            .parse_chain(
                br#"[
                    {"class": "GetAllElements"},
                    {"class": "ExportToSet", "key": "edges"},
                    {"class": "DiscardOutput"},
                    {"class": "GetSetExport", "key": "edges", "start": 2, "end": 4},
                    {"class": "ToArray"}
                ]"#,
            )
            .expect("chain");
        let ops = chain.operations();
        assert!(matches!(&ops[1], Operation::ExportToSet(export) if export.key == "edges"));
        assert!(matches!(
            &ops[3],
            Operation::GetSetExport(get) if get.key == "edges" && get.start == 2 && get.end == Some(4)
        ));
        assert_eq!(ops[4].kind(), OperationKind::ToArray);

        let unkeyed = registry
            .parse_operation(&json!({"class": "GetSetExport"}))
            .expect("parse");
        assert!(matches!(
            unkeyed,
            Operation::GetSetExport(get) if get.key == DEFAULT_EXPORT_KEY && get.end.is_none()
        ));
    }

    #[test]
    fn chain_documents_parse() {
        let registry = OperationRegistry::new();
        let chain = registry
            .parse_chain(br#"{"operations": [{"class": "GetAllElements"}, {"class": "Count"}]}"#)
            .expect("chain");
        assert_eq!(chain.kinds(), vec![OperationKind::GetAllElements, OperationKind::Count]);

        let single = registry
            .parse_chain(br#"{"class": "GetAllElements"}"#)
            .expect("single");
        assert_eq!(single.len(), 1);

        let bare = registry
            .parse_chain(br#"[{"class": "ToSet"}, {"class": "Count"}]"#)
            .expect("bare");
        assert_eq!(bare.len(), 2);
    }
}
