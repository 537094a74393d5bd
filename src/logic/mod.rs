pub mod command;
pub mod expand;
pub mod graph;
pub mod registry;
pub mod resolver;
pub mod sandbox;
pub mod translate;
pub mod validate;

pub use command::{build_args, build_command, ReasonerCommand};
pub use expand::{ExpandedOperations, Expander, NothingExpanded};
pub use graph::{DependencyGraph, GraphBuilder};
pub use registry::Registry;
pub use resolver::{is_external, Resolver};
pub use sandbox::Sandbox;
pub use translate::{PathTranslator, PublicPaths, WorkspacePaths};
pub use validate::{parse_operation, JsonSchemaValidator, SchemaId, SchemaValidator};
