use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;
use serde_json::Value;

use crate::config::Workspace;
use crate::error::{ResolveError, ResolveResult};
use crate::logic::registry::Registry;
use crate::logic::resolver::Resolver;
use crate::logic::translate::PathTranslator;
use crate::logic::validate::{parse_operation, SchemaValidator};
use crate::model::{
    DataTarget, Href, HrefSet, Imports, Inference, Operation, OperationId, OperationKind,
};

/// Operations that have already been expanded, keyed by identifier.
///
/// The graph hands its finished nodes to the expander through this view so
/// that imports reuse them instead of re-reading descriptor files.
pub trait ExpandedOperations {
    fn expanded(&self, id: &OperationId) -> Option<&Operation>;
}

/// No operation has been expanded yet; every import target is loaded on demand.
pub struct NothingExpanded;

impl ExpandedOperations for NothingExpanded {
    fn expanded(&self, _id: &OperationId) -> Option<&Operation> {
        None
    }
}

/// Rewrites declarations into their fully resolved form.
#[derive(Clone)]
pub struct Expander {
    workspace: Arc<Workspace>,
    registry: Registry,
    resolver: Resolver,
    validator: Arc<dyn SchemaValidator>,
}

impl Expander {
    pub fn new(
        workspace: Arc<Workspace>,
        validator: Arc<dyn SchemaValidator>,
        translator: Arc<dyn PathTranslator>,
    ) -> Self {
        Self {
            registry: Registry::new(workspace.clone()),
            resolver: Resolver::new(workspace.clone(), translator),
            workspace,
            validator,
        }
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Validate a raw declaration, then expand it relative to `base_dir`.
    pub fn expand_value(&self, base_dir: &Path, raw: &Value) -> ResolveResult<Operation> {
        let operation = parse_operation(self.validator.as_ref(), raw)?;
        self.expand(base_dir, operation)
    }

    pub fn expand(&self, base_dir: &Path, operation: Operation) -> ResolveResult<Operation> {
        self.expand_with(&NothingExpanded, base_dir, operation)
    }

    pub fn expand_with(
        &self,
        known: &dyn ExpandedOperations,
        base_dir: &Path,
        operation: Operation,
    ) -> ResolveResult<Operation> {
        let mut importers = Vec::new();
        self.expand_operation(known, &mut importers, base_dir, operation)
    }

    fn expand_operation(
        &self,
        known: &dyn ExpandedOperations,
        importers: &mut Vec<OperationId>,
        base_dir: &Path,
        mut operation: Operation,
    ) -> ResolveResult<Operation> {
        match operation.kind {
            OperationKind::Raw(_) | OperationKind::Query(_) => Ok(operation),
            OperationKind::Href(href) => {
                let resolved = self.resolver.to_single(base_dir, &href)?;
                operation.kind = OperationKind::Href(resolved.into());
                Ok(operation)
            }
            OperationKind::Inference(inference) => {
                operation.kind = OperationKind::Inference(self.expand_inference(base_dir, inference)?);
                Ok(operation)
            }
            OperationKind::Imports(ref imports) => {
                let imports = imports.clone();
                let importer =
                    OperationId::from_path(&self.workspace, &base_dir.join(&operation.name));
                if let Some(id) = &importer {
                    importers.push(id.clone());
                }
                let result = self.expand_imports(known, importers, base_dir, operation, imports);
                if importer.is_some() {
                    importers.pop();
                }
                result
            }
        }
    }

    /// Resolve the query hrefs one-to-one and the data hrefs one-to-many.
    pub fn expand_inference(
        &self,
        base_dir: &Path,
        mut inference: Inference,
    ) -> ResolveResult<Inference> {
        if let Some(href) = inference.query.href.take() {
            inference.query.href = Some(self.resolve_query(base_dir, href)?);
        }
        let data = self.resolve_data(base_dir, &inference.data.href)?;
        inference.data.href = HrefSet::Many(data);
        Ok(inference)
    }

    fn expand_imports(
        &self,
        known: &dyn ExpandedOperations,
        importers: &mut Vec<OperationId>,
        base_dir: &Path,
        operation: Operation,
        imports: Imports,
    ) -> ResolveResult<Operation> {
        let value = imports.href.to_string();
        let target_path = self.resolver.sandbox().resolve(base_dir, &value)?;
        let target_dir = target_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.workspace.root().to_path_buf());
        let not_found = |searched: PathBuf| ResolveError::NotFound {
            href: value.clone(),
            searched,
        };
        let target_id = OperationId::from_path(&self.workspace, &target_path)
            .ok_or_else(|| not_found(target_dir.clone()))?;

        if let Some(start) = importers.iter().position(|id| *id == target_id) {
            let mut cycle: Vec<String> = importers[start..].iter().map(ToString::to_string).collect();
            cycle.push(target_id.to_string());
            return Err(ResolveError::CycleDetected { cycle });
        }

        let target = match known.expanded(&target_id) {
            Some(expanded) => expanded.clone(),
            None => {
                let declared = self
                    .registry
                    .find_operation(self.validator.as_ref(), &target_path)?
                    .ok_or_else(|| not_found(target_dir.clone()))?;
                self.expand_operation(known, importers, &target_dir, declared)?
            }
        };
        debug!("'{}' imports {} ({})", operation.name, target_id, target.tag());

        let (kind, description) = match target.kind {
            OperationKind::Inference(inherited) => (
                OperationKind::Inference(self.merge_inference(base_dir, inherited, imports)?),
                operation.description.or(target.description),
            ),
            // aliases take the target as is, apart from name and content type
            other => (other, target.description),
        };

        Ok(Operation {
            name: operation.name,
            description,
            content_type: operation.content_type.or(target.content_type),
            kind,
        })
    }

    /// Importer fields override the inherited ones; `addData` extends the
    /// inherited data instead of replacing it.
    fn merge_inference(
        &self,
        base_dir: &Path,
        inherited: Inference,
        imports: Imports,
    ) -> ResolveResult<Inference> {
        let data = match (imports.add_data, imports.data) {
            (Some(additions), _) => {
                let mut merged = inherited.data.href.into_vec();
                for href in self.resolve_data(base_dir, &additions.href)? {
                    if !merged.contains(&href) {
                        merged.push(href);
                    }
                }
                DataTarget {
                    href: HrefSet::Many(merged),
                }
            }
            (None, Some(data)) => data,
            (None, None) => inherited.data,
        };

        let merged = Inference {
            query: imports.query.unwrap_or(inherited.query),
            data,
            proof: None,
            options: imports.options.or(inherited.options),
            flags: imports.flags.or(inherited.flags),
        };
        self.expand_inference(base_dir, merged)
    }

    fn resolve_query(&self, base_dir: &Path, href: HrefSet) -> ResolveResult<HrefSet> {
        Ok(match href {
            HrefSet::One(href) => HrefSet::One(self.resolver.to_single(base_dir, &href)?.into()),
            HrefSet::Many(list) => HrefSet::Many(
                list.iter()
                    .map(|href| self.resolver.to_single(base_dir, href).map(Href::from))
                    .collect::<ResolveResult<_>>()?,
            ),
        })
    }

    fn resolve_data(&self, base_dir: &Path, hrefs: &HrefSet) -> ResolveResult<Vec<Href>> {
        let mut resolved = Vec::new();
        for href in hrefs.iter() {
            resolved.extend(self.resolver.to_many(base_dir, href)?.into_iter().map(Href::from));
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Resolved;
    use crate::test_workspace::TestWorkspace;
    use serde_json::json;

    fn data_of(op: &Operation) -> Vec<String> {
        match &op.kind {
            OperationKind::Inference(inference) => {
                inference.data.href.iter().map(ToString::to_string).collect()
            }
            other => panic!("expected inference, got {other:?}"),
        }
    }

    #[test]
    fn raw_and_query_are_unchanged() {
        let ws = TestWorkspace::new();
        let expander = ws.expander();

        let raw = json!({"name": "r", "raw": "<a> <b> <c>."});
        let op = expander.expand_value(ws.root(), &raw).unwrap();
        assert_eq!(op.kind, OperationKind::Raw(json!("<a> <b> <c>.")));

        let query = json!({"name": "q", "query": {"endpoint": "http://x/sparql", "raw": "ASK {}"}});
        let op = expander.expand_value(ws.root(), &query).unwrap();
        assert!(matches!(op.kind, OperationKind::Query(_)));
    }

    #[test]
    fn href_resolves_to_a_file() {
        let ws = TestWorkspace::new();
        let file = ws.file("lib/facts.n3", "");
        let op = ws
            .expander()
            .expand_value(&ws.path("lib"), &json!({"name": "f", "href": "facts.n3"}))
            .unwrap();
        assert_eq!(op.kind, OperationKind::Href(Resolved::File(file).into()));
    }

    #[test]
    fn invalid_declarations_fail_before_expansion() {
        let ws = TestWorkspace::new();
        let err = ws
            .expander()
            .expand_value(ws.root(), &json!({"name": "x", "href": 3}))
            .unwrap_err();
        assert_eq!(err.kind(), "BadDescriptor");
    }

    #[test]
    fn inference_data_globs_are_flattened() {
        let ws = TestWorkspace::new();
        ws.file("lib/q.n3", "");
        ws.file("lib/data/a.n3", "");
        ws.file("lib/data/b.n3", "");
        let op = ws
            .expander()
            .expand_value(
                &ws.path("lib"),
                &json!({"name": "i", "inference": {
                    "query": {"href": "q.n3"},
                    "data": {"href": ["data/*.n3", "http://example.org/x"]}
                }}),
            )
            .unwrap();

        let data = data_of(&op);
        assert_eq!(data.len(), 3);
        assert!(data[0].ends_with("data/a.n3"));
        assert!(data[1].ends_with("data/b.n3"));
        assert_eq!(data[2], "http://example.org/x");
    }

    #[test]
    fn add_data_appends_unique_hrefs() {
        let ws = TestWorkspace::new();
        ws.file("base/q.n3", "");
        ws.file("base/a.n3", "");
        ws.file("base/b.n3", "");
        ws.file("child/c.n3", "");
        ws.descriptor(
            "base",
            json!([{"name": "reason", "inference": {
                "query": {"href": "q.n3"},
                "data": {"href": ["a.n3", "b.n3"]}
            }}]),
        );

        let op = ws
            .expander()
            .expand_value(
                &ws.path("child"),
                &json!({"name": "more", "Content-Type": "text/n3", "imports": {
                    "href": "../base/reason",
                    "addData": {"href": ["c.n3", "../base/a.n3"]}
                }}),
            )
            .unwrap();

        assert_eq!(op.name, "more");
        assert_eq!(op.content_type.as_deref(), Some("text/n3"));
        let data = data_of(&op);
        assert_eq!(data.len(), 3);
        assert!(data[0].ends_with("base/a.n3"));
        assert!(data[1].ends_with("base/b.n3"));
        assert!(data[2].ends_with("child/c.n3"));
    }

    #[test]
    fn add_data_keeps_duplicates_already_inherited() {
        let ws = TestWorkspace::new();
        ws.file("base/q.n3", "");
        ws.file("base/a.n3", "");
        ws.file("base/b.n3", "");
        ws.file("base/c.n3", "");
        ws.file("extra/d.n3", "");
        ws.descriptor(
            "base",
            json!([{"name": "reason", "inference": {
                "query": {"href": "q.n3"},
                "data": {"href": ["a.n3", "*.n3"]}
            }}]),
        );

        let op = ws
            .expander()
            .expand_value(
                &ws.path("base"),
                &json!({"name": "more", "imports": {
                    "href": "reason",
                    "addData": {"href": ["c.n3", "../extra/d.n3", "b.n3", "../extra/d.n3"]}
                }}),
            )
            .unwrap();

        let data = data_of(&op);
        let names: Vec<&str> = data
            .iter()
            .map(|href| href.rsplit('/').next().unwrap())
            .collect();
        assert_eq!(names, vec!["a.n3", "a.n3", "b.n3", "c.n3", "q.n3", "d.n3"]);
    }

    #[test]
    fn explicit_data_replaces_inherited() {
        let ws = TestWorkspace::new();
        ws.file("base/q.n3", "");
        ws.file("base/a.n3", "");
        ws.file("child/own.n3", "");
        ws.descriptor(
            "base",
            json!([{"name": "reason", "inference": {
                "query": {"href": "q.n3"},
                "data": {"href": "a.n3"},
                "flags": ["--nope"]
            }}]),
        );

        let op = ws
            .expander()
            .expand_value(
                &ws.path("child"),
                &json!({"name": "own", "imports": {
                    "href": "/base/reason",
                    "data": {"href": "own.n3"}
                }}),
            )
            .unwrap();

        let data = data_of(&op);
        assert_eq!(data.len(), 1);
        assert!(data[0].ends_with("child/own.n3"));
        match op.kind {
            OperationKind::Inference(inference) => {
                assert_eq!(inference.flags, Some(vec!["--nope".to_string()]));
                let query = inference.query.href.unwrap();
                assert!(query.iter().all(Href::is_resolved));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn importing_a_non_inference_aliases_it() {
        let ws = TestWorkspace::new();
        ws.descriptor(
            "base",
            json!([{"name": "facts", "description": "shared", "raw": "<a> <b> <c>."}]),
        );

        let op = ws
            .expander()
            .expand_value(
                ws.root(),
                &json!({"name": "alias", "imports": {"href": "base/facts"}}),
            )
            .unwrap();

        assert_eq!(op.name, "alias");
        assert_eq!(op.description.as_deref(), Some("shared"));
        assert_eq!(op.kind, OperationKind::Raw(json!("<a> <b> <c>.")));
    }

    #[test]
    fn aliases_drop_the_importer_description() {
        let ws = TestWorkspace::new();
        ws.descriptor(
            "base",
            json!([{"name": "facts", "description": "shared", "raw": "<a> <b> <c>."}]),
        );

        let op = ws
            .expander()
            .expand_value(
                ws.root(),
                &json!({"name": "alias", "description": "mine", "Content-Type": "text/n3",
                        "imports": {"href": "base/facts"}}),
            )
            .unwrap();

        assert_eq!(op.name, "alias");
        assert_eq!(op.description.as_deref(), Some("shared"));
        assert_eq!(op.content_type.as_deref(), Some("text/n3"));
        assert_eq!(op.kind, OperationKind::Raw(json!("<a> <b> <c>.")));
    }

    #[test]
    fn missing_import_target_is_not_found() {
        let ws = TestWorkspace::new();
        let err = ws
            .expander()
            .expand_value(ws.root(), &json!({"name": "x", "imports": {"href": "nope/op"}}))
            .unwrap_err();
        assert_eq!(err.kind(), "NotFound");
    }

    #[test]
    fn import_cycles_are_detected() {
        let ws = TestWorkspace::new();
        ws.descriptor(
            "",
            json!([
                {"name": "a", "imports": {"href": "b"}},
                {"name": "b", "imports": {"href": "a"}}
            ]),
        );

        let err = ws
            .expander()
            .expand_value(ws.root(), &json!({"name": "a", "imports": {"href": "b"}}))
            .unwrap_err();
        match err {
            ResolveError::CycleDetected { cycle } => assert_eq!(cycle, vec!["/a", "/b", "/a"]),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
