use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(
    author,
    version,
    about = "Schema-driven model element store with integrity validation"
)]
pub struct Cli {
    /// Project id to operate on (defaults to the registry's resolution chain)
    #[clap(long, short = 'p')]
    pub project: Option<String>,

    /// Directory holding project store files (bypasses the registry)
    #[clap(long)]
    pub data_dir: Option<PathBuf>,

    /// Path to a schema YAML document (defaults to the built-in class set)
    #[clap(long)]
    pub schema: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum ElementCommand {
    /// Create a new element
    Add {
        /// Class name of the element
        #[clap(long)]
        class: String,

        /// Attribute values as NAME=VALUE pairs (repeatable)
        #[clap(long = "attr", value_name = "NAME=VALUE")]
        attrs: Vec<String>,

        /// Id of the container element to nest under
        #[clap(long)]
        container: Option<String>,
    },

    /// List elements in depth-first order
    List {
        /// Keep only elements of this exact class
        #[clap(long)]
        class: Option<String>,

        /// Number of elements to skip
        #[clap(long, default_value_t = 0)]
        offset: usize,

        /// Maximum number of elements to print
        #[clap(long)]
        limit: Option<usize>,
    },

    /// Show one element in full
    Show {
        /// Element id
        id: String,
    },

    /// Apply a partial update to an element
    Set {
        /// Element id
        id: String,

        /// Attribute values as NAME=VALUE pairs (repeatable)
        #[clap(long = "attr", value_name = "NAME=VALUE")]
        attrs: Vec<String>,
    },

    /// Point a reference field at another element
    SetRef {
        /// Element id
        id: String,

        /// Reference field name
        #[clap(long)]
        field: String,

        /// Target element id
        #[clap(long)]
        target: String,
    },

    /// Delete an element and everything it contains
    Del {
        /// Element id
        id: String,

        /// Skip the confirmation prompt
        #[clap(long, short = 'y')]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum RelationCommand {
    /// Create a relationship between two elements
    Add {
        /// Source element id
        #[clap(long)]
        from: String,

        /// Target element id
        #[clap(long)]
        to: String,

        /// Relation kind (derive, satisfy, refine, trace)
        #[clap(long)]
        kind: String,

        /// Also enforce class-level semantics for the kind
        #[clap(long)]
        strict: bool,
    },

    /// List relationships
    List {
        /// Keep only relationships of this kind
        #[clap(long)]
        kind: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ProjectCommand {
    /// Register a project in the registry
    Register {
        /// Name of the project
        name: String,

        /// Path to the project's store file
        #[clap(long)]
        path: PathBuf,

        /// Description of the project
        #[clap(long, default_value = "")]
        description: String,

        /// Set this project as the default
        #[clap(long)]
        default: bool,
    },

    /// List all registered projects
    List,

    /// Print the path to a project's store file
    Path {
        /// Project name (defaults to the resolved project)
        name: Option<String>,
    },

    /// Set the default project
    SetDefault {
        /// Project name
        name: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum SchemaCommand {
    /// List all classes known to the schema
    Classes,

    /// Show the flattened field list of a class
    Fields {
        /// Class name
        class: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create, inspect, update and delete elements
    #[clap(subcommand)]
    Element(ElementCommand),

    /// Create and list relationships between elements
    #[clap(subcommand)]
    Relation(RelationCommand),

    /// Run the consistency rules and print the report
    Validate {
        /// Print the report as JSON instead of human-readable text
        #[clap(long)]
        json: bool,
    },

    /// Count dangling non-containment reference targets
    Integrity,

    /// Manage the project registry
    #[clap(subcommand)]
    Project(ProjectCommand),

    /// Inspect the active schema
    #[clap(subcommand)]
    Schema(SchemaCommand),
}
