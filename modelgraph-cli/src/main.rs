mod cli;

use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::Colorize;
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;

use modelgraph_core::{
    check_relation_classes, get_registry_path, relation_kind_of, AttrValue, Element, ElementStore,
    ProjectRegistry, QueryFilter, RelationKind, SchemaProvider, SchemaRegistry, ValidationReport,
    YamlBackend, CLASS_RELATIONSHIP, FIELD_FROM, FIELD_TO,
};

use crate::cli::{Cli, Command, ElementCommand, ProjectCommand, RelationCommand, SchemaCommand};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Registry and project resolution
    let registry_path = get_registry_path()?;
    if !registry_path.exists() {
        ProjectRegistry::create_default(&registry_path)?;
    }
    let registry = ProjectRegistry::load(&registry_path)
        .with_context(|| format!("failed to load registry {:?}", registry_path))?;
    let project = registry.resolve_project(cli.project.as_deref())?;

    let base_dir = match &cli.data_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir()?,
    };
    let backend = if cli.data_dir.is_some() {
        YamlBackend::new(&base_dir)
    } else {
        YamlBackend::with_registry(&base_dir, &registry)
    };

    let schema = match &cli.schema {
        Some(path) => SchemaRegistry::from_yaml_file(path)
            .with_context(|| format!("failed to load schema {:?}", path))?,
        None => SchemaRegistry::builtin(),
    };

    match &cli.command {
        Command::Element(element_cmd) => {
            let store = into_store(backend, schema);
            handle_element_command(element_cmd, &store, &project)?;
        }
        Command::Relation(relation_cmd) => {
            let store = into_store(backend, schema);
            handle_relation_command(relation_cmd, &store, &project)?;
        }
        Command::Validate { json } => {
            let store = into_store(backend, schema);
            let report = store.validate(&project)?;
            if *json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&project, &report);
            }
            if !report.is_clean() {
                std::process::exit(1);
            }
        }
        Command::Integrity => {
            let store = into_store(backend, schema);
            let broken = store.reference_integrity(&project)?;
            if broken == 0 {
                println!("{}", "All references resolve.".green());
            } else {
                println!("{}", format!("{} broken reference(s)", broken).red());
            }
        }
        Command::Project(project_cmd) => {
            handle_project_command(project_cmd, &registry_path, &backend, &project)?;
        }
        Command::Schema(schema_cmd) => {
            handle_schema_command(schema_cmd, &schema)?;
        }
    }

    Ok(())
}

fn into_store(backend: YamlBackend, schema: SchemaRegistry) -> ElementStore {
    let schema: Arc<dyn SchemaProvider> = Arc::new(schema);
    ElementStore::new(Box::new(backend), schema)
}

/// Parses repeated NAME=VALUE arguments into an attribute map. Values are
/// read as YAML scalars, so `count=3` is an integer and `done=true` a bool.
fn parse_attrs(pairs: &[String]) -> Result<BTreeMap<String, AttrValue>> {
    let mut attrs = BTreeMap::new();
    for pair in pairs {
        let Some((name, raw)) = pair.split_once('=') else {
            bail!("invalid attribute '{}', expected NAME=VALUE", pair);
        };
        let value = serde_yaml::from_str::<AttrValue>(raw)
            .unwrap_or_else(|_| AttrValue::Str(raw.to_string()));
        attrs.insert(name.to_string(), value);
    }
    Ok(attrs)
}

fn handle_element_command(
    command: &ElementCommand,
    store: &ElementStore,
    project: &str,
) -> Result<()> {
    match command {
        ElementCommand::Add {
            class,
            attrs,
            container,
        } => {
            let attrs = parse_attrs(attrs)?;
            let element = store.create(project, class, attrs, container.as_deref())?;
            println!("{}", "Element created successfully!".green());
            println!("ID: {}", element.id.green());
        }
        ElementCommand::List {
            class,
            offset,
            limit,
        } => {
            let filter = QueryFilter {
                class_name: class.clone(),
                offset: *offset,
                limit: *limit,
            };
            let elements = store.query(project, &filter)?;
            if elements.is_empty() {
                println!("{}", "No elements found.".yellow());
                return Ok(());
            }
            for element in &elements {
                let name = element
                    .attribute("name")
                    .or_else(|| element.attribute("reqId"))
                    .map(|v| v.to_string())
                    .unwrap_or_default();
                println!(
                    "{}  {}  {}",
                    element.id.bold(),
                    element.class_name.cyan(),
                    name
                );
            }
            println!("{} element(s)", elements.len());
        }
        ElementCommand::Show { id } => {
            let Some(element) = store.find(project, id)? else {
                bail!("element not found: {}", id);
            };
            print!("{}", serde_yaml::to_string(&element)?);
        }
        ElementCommand::Set { id, attrs } => {
            let patch = parse_attrs(attrs)?;
            let element = store.update(project, id, patch)?;
            println!("{}", "Element updated successfully!".green());
            print!("{}", serde_yaml::to_string(&element)?);
        }
        ElementCommand::SetRef { id, field, target } => {
            store.set_reference(project, id, field, target)?;
            println!(
                "{}",
                format!("Reference {} -> {} set on {}", field, target, id).green()
            );
        }
        ElementCommand::Del { id, yes } => {
            if !yes && !confirm(&format!("Delete {} and everything it contains?", id))? {
                println!("{}", "Aborted.".yellow());
                return Ok(());
            }
            if store.delete(project, id)? {
                println!("{}", format!("Deleted {}", id).green());
            } else {
                println!("{}", format!("Nothing to delete for {}", id).yellow());
            }
        }
    }
    Ok(())
}

fn handle_relation_command(
    command: &RelationCommand,
    store: &ElementStore,
    project: &str,
) -> Result<()> {
    match command {
        RelationCommand::Add {
            from,
            to,
            kind,
            strict,
        } => {
            let kind: RelationKind = kind.parse()?;
            if *strict {
                let from_class = class_of(store, project, from)?;
                let to_class = class_of(store, project, to)?;
                check_relation_classes(store.schema(), kind, &from_class, &to_class)?;
            }
            let outcome = store.create_relation(project, kind, from, to)?;
            if outcome.created {
                println!("{}", "Relationship created successfully!".green());
            } else {
                println!("{}", "Relationship already exists.".yellow());
            }
            println!("ID: {}", outcome.element.id.green());
        }
        RelationCommand::List { kind } => {
            let kind_filter = kind
                .as_deref()
                .map(str::parse::<RelationKind>)
                .transpose()?;
            let filter = QueryFilter {
                class_name: Some(CLASS_RELATIONSHIP.to_string()),
                ..QueryFilter::default()
            };
            let relationships: Vec<Element> = store
                .query(project, &filter)?
                .into_iter()
                .filter(|element| match kind_filter {
                    Some(kind) => relation_kind_of(element) == Some(kind),
                    None => true,
                })
                .collect();
            if relationships.is_empty() {
                println!("{}", "No relationships found.".yellow());
                return Ok(());
            }
            for element in &relationships {
                let kind = relation_kind_of(element)
                    .map(|k| k.to_string())
                    .unwrap_or_else(|| "?".to_string());
                println!(
                    "{}  {} -{}-> {}",
                    element.id.bold(),
                    element.reference_id(FIELD_FROM).unwrap_or("?"),
                    kind.cyan(),
                    element.reference_id(FIELD_TO).unwrap_or("?")
                );
            }
            println!("{} relationship(s)", relationships.len());
        }
    }
    Ok(())
}

fn handle_project_command(
    command: &ProjectCommand,
    registry_path: &std::path::Path,
    backend: &YamlBackend,
    resolved: &str,
) -> Result<()> {
    match command {
        ProjectCommand::Register {
            name,
            path,
            description,
            default,
        } => {
            let mut registry = ProjectRegistry::load(registry_path)?;
            registry.register(
                name.clone(),
                path.display().to_string(),
                description.clone(),
            );
            if *default {
                registry.set_default(name)?;
            }
            registry.save(registry_path)?;
            println!("{}", format!("Registered project '{}'", name).green());
        }
        ProjectCommand::List => {
            let registry = ProjectRegistry::load(registry_path)?;
            for (name, entry) in registry.entries() {
                let marker = if registry.default_project.as_deref() == Some(name) {
                    " (default)"
                } else {
                    ""
                };
                println!("{}{}  {}  {}", name.bold(), marker, entry.path, entry.description);
            }
        }
        ProjectCommand::Path { name } => {
            let project = name.as_deref().unwrap_or(resolved);
            println!("{}", backend.path_for(project).display());
        }
        ProjectCommand::SetDefault { name } => {
            let mut registry = ProjectRegistry::load(registry_path)?;
            registry.set_default(name)?;
            registry.save(registry_path)?;
            println!("{}", format!("Default project is now '{}'", name).green());
        }
    }
    Ok(())
}

fn handle_schema_command(command: &SchemaCommand, schema: &SchemaRegistry) -> Result<()> {
    match command {
        SchemaCommand::Classes => {
            for class in schema.classes() {
                let marker = if class.is_abstract { " (abstract)" } else { "" };
                match &class.parent {
                    Some(parent) => println!("{}{} < {}", class.name.bold(), marker, parent),
                    None => println!("{}{}", class.name.bold(), marker),
                }
            }
        }
        SchemaCommand::Fields { class } => {
            let Some(fields) = schema.fields_of(class) else {
                bail!("unknown class: {}", class);
            };
            for field in fields {
                match field {
                    modelgraph_core::FieldDef::Attribute {
                        name,
                        value_type,
                        many,
                    } => {
                        let many = if *many { "[]" } else { "" };
                        println!("{}  attribute {:?}{}", name.bold(), value_type, many);
                    }
                    modelgraph_core::FieldDef::Reference {
                        name,
                        target_type,
                        containment,
                        many,
                    } => {
                        let many = if *many { "[]" } else { "" };
                        let containment = if *containment { " containment" } else { "" };
                        println!(
                            "{}  reference -> {}{}{}",
                            name.bold(),
                            target_type,
                            many,
                            containment
                        );
                    }
                }
            }
        }
    }
    Ok(())
}

fn print_report(project: &str, report: &ValidationReport) {
    println!(
        "Validated {} element(s) in project '{}' in {} ms",
        report.element_count, project, report.processing_time_ms
    );
    if report.is_clean() {
        println!("{}", "No violations found.".green());
        return;
    }
    for violation in &report.violations {
        println!(
            "{}  {}  {}",
            violation.rule_code.to_string().red().bold(),
            violation.target_id.bold(),
            violation.message
        );
    }
    println!(
        "{}",
        format!("{} violation(s)", report.violations.len()).red()
    );
}

fn class_of(store: &ElementStore, project: &str, id: &str) -> Result<String> {
    store
        .find(project, id)?
        .map(|element| element.class_name)
        .with_context(|| format!("element not found: {}", id))
}

fn confirm(question: &str) -> Result<bool> {
    print!("{} [y/N] ", question);
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
