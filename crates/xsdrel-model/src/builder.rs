//! Model builder: walks an XSD and produces a [`Model`] (spec.md §4.3).

use std::collections::{HashMap, HashSet};

use roxmltree::Node;

use crate::error::{ModelError, Result};
use crate::ident::pascal_sanitized;
use crate::model::{Column, ElementBindings, ForeignKey, Model, SqlType};
use crate::types::{facet_checks, map_simple_type, Facets};

const XS_NS: &str = "http://www.w3.org/2001/XMLSchema";

pub const DEFAULT_SCHEMA: &str = "xsd";

/// Parse `xsd_text` and build the relational [`Model`]. `schema` is the SQL
/// Server schema every table is created in (spec.md §3 `Table.schema`).
pub fn build_model(xsd_text: &str, schema: &str) -> Result<Model> {
    let doc = roxmltree::Document::parse(xsd_text)?;
    let root = doc.root_element();
    if root.tag_name().namespace() != Some(XS_NS) || root.tag_name().name() != "schema" {
        return Err(ModelError::Malformed("root element is not xs:schema".to_string()));
    }

    let target_ns = root.attribute("targetNamespace").map(|s| s.to_string());

    let mut complex_types: HashMap<String, Node> = HashMap::new();
    let mut simple_types: HashMap<String, Node> = HashMap::new();
    for child in root.children().filter(|n| n.is_element()) {
        if is_xs(&child, "complexType") {
            if let Some(name) = child.attribute("name") {
                complex_types.insert(name.to_string(), child);
            }
        } else if is_xs(&child, "simpleType") {
            if let Some(name) = child.attribute("name") {
                simple_types.insert(name.to_string(), child);
            }
        }
    }

    let global_elements: Vec<Node> = root
        .children()
        .filter(|n| n.is_element() && is_xs(n, "element"))
        .collect();

    let mut local_name_counts: HashMap<&str, u32> = HashMap::new();
    for el in &global_elements {
        if let Some(name) = el.attribute("name") {
            *local_name_counts.entry(name).or_insert(0) += 1;
        }
    }
    let colliding: HashSet<&str> = local_name_counts
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(name, _)| name)
        .collect();

    let ctx = BuildCtx { complex_types, simple_types };

    let mut model = Model::new(schema);

    for el in &global_elements {
        let local_name = el.attribute("name").ok_or_else(|| {
            ModelError::Malformed("global xs:element missing name attribute".to_string())
        })?;

        let table_name = if colliding.contains(local_name) {
            namespaced_table_name(local_name, target_ns.as_deref())
        } else {
            pascal_sanitized(local_name)
        };

        let table_idx = model.lookup_or_insert(&table_name);
        model.bind_element(target_ns.clone(), local_name.to_string(), table_name.clone());

        walk_element_type(&ctx, &mut model, table_idx, *el, None, false)?;
    }

    Ok(model)
}

fn namespaced_table_name(local_name: &str, ns: Option<&str>) -> String {
    match ns {
        Some(ns) => {
            let token = ns
                .trim_end_matches('/')
                .rsplit(['/', ':'])
                .find(|s| !s.is_empty())
                .unwrap_or("Ns");
            format!("{}{}", pascal_sanitized(token), pascal_sanitized(local_name))
        }
        None => pascal_sanitized(local_name),
    }
}

fn is_xs(node: &Node, local: &str) -> bool {
    node.tag_name().namespace() == Some(XS_NS) && node.tag_name().name() == local
}

struct BuildCtx<'a> {
    complex_types: HashMap<String, Node<'a, 'a>>,
    simple_types: HashMap<String, Node<'a, 'a>>,
}

/// Resolve a `type="..."` reference (or an inline child type node) down to
/// its builtin base and accumulated facets, following at most one level of
/// named-simpleType indirection (sufficient for the restriction chains XSDs
/// actually use in practice).
fn resolve_simple(ctx: &BuildCtx, type_attr: Option<&str>, inline: Option<Node>) -> (String, Facets) {
    if let Some(node) = inline.filter(|n| is_xs(n, "simpleType")) {
        return resolve_simple_type_node(ctx, node);
    }
    if let Some(qname) = type_attr {
        let local = local_part(qname);
        if is_builtin(local) {
            return (local.to_string(), Facets::default());
        }
        if let Some(node) = ctx.simple_types.get(local) {
            return resolve_simple_type_node(ctx, *node);
        }
    }
    ("string".to_string(), Facets::default())
}

fn resolve_simple_type_node(ctx: &BuildCtx, node: Node) -> (String, Facets) {
    let restriction = node.children().find(|n| is_xs(n, "restriction"));
    let Some(restriction) = restriction else {
        return ("string".to_string(), Facets::default());
    };
    let base = restriction.attribute("base").map(local_part).unwrap_or("string");

    let (base_name, mut facets) = if is_builtin(base) {
        (base.to_string(), Facets::default())
    } else if let Some(named) = ctx.simple_types.get(base) {
        resolve_simple_type_node(ctx, *named)
    } else {
        (base.to_string(), Facets::default())
    };

    for facet in restriction.children().filter(|n| n.is_element()) {
        let value = facet.attribute("value");
        match facet.tag_name().name() {
            "length" => facets.length = value.and_then(|v| v.parse().ok()),
            "minLength" => facets.min_length = value.and_then(|v| v.parse().ok()),
            "maxLength" => facets.max_length = value.and_then(|v| v.parse().ok()),
            "totalDigits" => facets.total_digits = value.and_then(|v| v.parse().ok()),
            "fractionDigits" => facets.fraction_digits = value.and_then(|v| v.parse().ok()),
            "minInclusive" => facets.min_inclusive = value.map(String::from),
            "maxInclusive" => facets.max_inclusive = value.map(String::from),
            "minExclusive" => facets.min_exclusive = value.map(String::from),
            "maxExclusive" => facets.max_exclusive = value.map(String::from),
            _ => {}
        }
    }

    (base_name, facets)
}

fn local_part(qname: &str) -> &str {
    qname.rsplit_once(':').map(|(_, n)| n).unwrap_or(qname)
}

fn is_builtin(local: &str) -> bool {
    matches!(
        local,
        "string"
            | "normalizedString"
            | "token"
            | "Name"
            | "NCName"
            | "ID"
            | "IDREF"
            | "language"
            | "anyURI"
            | "decimal"
            | "integer"
            | "long"
            | "int"
            | "short"
            | "byte"
            | "unsignedByte"
            | "unsignedShort"
            | "unsignedInt"
            | "unsignedLong"
            | "negativeInteger"
            | "nonNegativeInteger"
            | "nonPositiveInteger"
            | "positiveInteger"
            | "boolean"
            | "float"
            | "double"
            | "date"
            | "dateTime"
            | "time"
            | "duration"
    )
}

fn apply_column_with_checks(model: &mut Model, table_idx: usize, name: &str, sql_type: SqlType, nullable: bool, facets: &Facets, is_id: bool) {
    let column = Column::new(name, sql_type.clone(), nullable);
    model.table_mut(table_idx).add_or_merge_column(column);

    for predicate in facet_checks(name, &sql_type, nullable, facets) {
        model.table_mut(table_idx).add_check_if_new(name, predicate.expression);
    }

    if is_id {
        let table = model.table_mut(table_idx);
        let uq_name = format!("UQ_{}_{}", table.name, name);
        if !table.uniques.iter().any(|u| u.columns == vec![name.to_string()]) {
            table.uniques.push(crate::model::UniqueConstraint {
                name: uq_name,
                columns: vec![name.to_string()],
            });
        }
    }
}

/// Recurse into the type of `el`, filling columns/child tables rooted at
/// `table_idx` (the table that owns this element). `in_choice` carries the
/// spec.md §4.3 choice-context nullability/discriminator rule.
fn walk_element_type(
    ctx: &BuildCtx,
    model: &mut Model,
    table_idx: usize,
    el: Node,
    _parent_table_idx: Option<usize>,
    in_choice: bool,
) -> Result<()> {
    let min_occurs_zero = el.attribute("minOccurs") == Some("0");
    let nullable = min_occurs_zero || in_choice;

    let inline_complex = el.children().find(|n| is_xs(n, "complexType"));
    let inline_simple = el.children().find(|n| is_xs(n, "simpleType"));
    let type_attr = el.attribute("type");

    let complex_node = inline_complex.or_else(|| {
        type_attr
            .map(local_part)
            .and_then(|local| ctx.complex_types.get(local).copied())
    });

    if let Some(complex) = complex_node {
        walk_complex_type(ctx, model, table_idx, complex, nullable)?;
    } else {
        let (base, facets) = resolve_simple(ctx, type_attr, inline_simple);
        let sql_type = map_simple_type(&base, &facets);
        let name = el.attribute("name").map(pascal_sanitized).unwrap_or_else(|| model.table(table_idx).name.clone());
        apply_column_with_checks(model, table_idx, &name, sql_type, nullable, &facets, base == "ID");
    }

    walk_identity_constraints(model, table_idx, el);
    Ok(())
}

fn walk_identity_constraints(model: &mut Model, table_idx: usize, el: Node) {
    for ic in el.children().filter(|n| is_xs(n, "key") || is_xs(n, "unique")) {
        let mut columns = Vec::new();
        for field in ic.children().filter(|n| is_xs(n, "field")) {
            let Some(xpath) = field.attribute("xpath") else { continue };
            let last_step = xpath.rsplit('/').next().unwrap_or(xpath).trim();
            let candidate = last_step.trim_start_matches('@');
            let column_name = pascal_sanitized(candidate);
            if model.table(table_idx).has_column(&column_name) {
                columns.push(column_name);
            }
        }
        if !columns.is_empty() {
            let table = model.table_mut(table_idx);
            let uq_name = format!("UQ_{}_{}", table.name, columns.join("_"));
            if !table.uniques.iter().any(|u| u.columns == columns) {
                table.uniques.push(crate::model::UniqueConstraint { name: uq_name, columns });
            }
        }
    }
}

fn walk_complex_type(ctx: &BuildCtx, model: &mut Model, table_idx: usize, complex: Node, _self_nullable: bool) -> Result<()> {
    // simpleContent: the element's own text becomes a column, attributes
    // on the extension add further columns on the current table.
    if let Some(simple_content) = complex.children().find(|n| is_xs(n, "simpleContent")) {
        if let Some(ext) = simple_content.children().find(|n| is_xs(n, "extension") || is_xs(n, "restriction")) {
            let base = ext.attribute("base").map(local_part).unwrap_or("string");
            let (base_name, facets) = if is_builtin(base) {
                (base.to_string(), Facets::default())
            } else if let Some(named) = ctx.simple_types.get(base) {
                resolve_simple_type_node(ctx, *named)
            } else {
                (base.to_string(), Facets::default())
            };
            let sql_type = map_simple_type(&base_name, &facets);
            let col_name = model.table(table_idx).name.clone();
            apply_column_with_checks(model, table_idx, &col_name, sql_type, true, &facets, base_name == "ID");

            for attr in ext.children().filter(|n| is_xs(n, "attribute")) {
                walk_attribute(ctx, model, table_idx, attr);
            }
        }
        return Ok(());
    }

    // complexContent extension: process the base complex type first, then
    // this type's own additions.
    if let Some(complex_content) = complex.children().find(|n| is_xs(n, "complexContent")) {
        if let Some(ext) = complex_content.children().find(|n| is_xs(n, "extension")) {
            if let Some(base_local) = ext.attribute("base").map(local_part) {
                if let Some(base_node) = ctx.complex_types.get(base_local).copied() {
                    walk_complex_type(ctx, model, table_idx, base_node, false)?;
                }
            }
            walk_attrs_and_particle(ctx, model, table_idx, ext)?;
        }
        return Ok(());
    }

    walk_attrs_and_particle(ctx, model, table_idx, complex)
}

fn walk_attrs_and_particle(ctx: &BuildCtx, model: &mut Model, table_idx: usize, container: Node) -> Result<()> {
    for attr in container.children().filter(|n| is_xs(n, "attribute")) {
        walk_attribute(ctx, model, table_idx, attr);
    }

    for particle in container
        .children()
        .filter(|n| is_xs(n, "sequence") || is_xs(n, "all") || is_xs(n, "choice"))
    {
        walk_particle(ctx, model, table_idx, particle, false)?;
    }

    Ok(())
}

fn walk_attribute(ctx: &BuildCtx, model: &mut Model, table_idx: usize, attr: Node) {
    let Some(name) = attr.attribute("name") else { return };
    let nullable = attr.attribute("use") != Some("required");
    let type_attr = attr.attribute("type");
    let inline_simple = attr.children().find(|n| is_xs(n, "simpleType"));
    let (base, facets) = resolve_simple(ctx, type_attr, inline_simple);
    let sql_type = map_simple_type(&base, &facets);
    let column_name = pascal_sanitized(name);
    apply_column_with_checks(model, table_idx, &column_name, sql_type, nullable, &facets, base == "ID");
}

fn walk_particle(ctx: &BuildCtx, model: &mut Model, table_idx: usize, particle: Node, inherited_choice: bool) -> Result<()> {
    let is_choice = is_xs(&particle, "choice");
    if is_choice {
        apply_column_with_checks(
            model,
            table_idx,
            "ChoiceOption",
            SqlType::NVarChar(crate::model::NVarCharLen::Fixed(64)),
            true,
            &Facets::default(),
            false,
        );
    }
    let in_choice = inherited_choice || is_choice;

    for child in particle.children().filter(|n| n.is_element()) {
        if is_xs(&child, "element") {
            walk_child_element(ctx, model, table_idx, child, in_choice)?;
        } else if is_xs(&child, "choice") || is_xs(&child, "sequence") || is_xs(&child, "all") {
            walk_particle(ctx, model, table_idx, child, in_choice)?;
        }
    }
    Ok(())
}

fn max_occurs_gt_one(el: &Node) -> bool {
    match el.attribute("maxOccurs") {
        Some("unbounded") => true,
        Some(n) => n.parse::<u32>().map(|v| v > 1).unwrap_or(false),
        None => false,
    }
}

fn is_non_simple(ctx: &BuildCtx, el: &Node) -> bool {
    if el.children().any(|n| is_xs(&n, "complexType")) {
        return true;
    }
    if let Some(type_attr) = el.attribute("type") {
        let local = local_part(type_attr);
        if ctx.complex_types.contains_key(local) {
            return true;
        }
    }
    false
}

fn walk_child_element(ctx: &BuildCtx, model: &mut Model, parent_idx: usize, child: Node, in_choice: bool) -> Result<()> {
    // A `ref="..."` child refers to a global element; treat it like an
    // inline declaration of the same name for cardinality purposes, table
    // naming still derives from the ref's local name.
    let local_name = child
        .attribute("name")
        .or_else(|| child.attribute("ref").map(local_part))
        .ok_or_else(|| ModelError::Malformed("xs:element with no name or ref".to_string()))?
        .to_string();

    if max_occurs_gt_one(&child) || is_non_simple(ctx, &child) {
        let parent_name = model.table(parent_idx).name.clone();
        let child_table_name = pascal_sanitized(&format!("{parent_name}_{local_name}"));
        let child_idx = model.lookup_or_insert(&child_table_name);

        ensure_parent_fk(model, child_idx, parent_idx);

        if in_choice {
            apply_column_with_checks(
                model,
                child_idx,
                "ChoiceParentOption",
                SqlType::NVarChar(crate::model::NVarCharLen::Fixed(64)),
                true,
                &Facets::default(),
                false,
            );
        }

        walk_element_type(ctx, model, child_idx, child, Some(parent_idx), false)?;
    } else {
        let nullable = child.attribute("minOccurs") == Some("0") || in_choice;
        let type_attr = child.attribute("type");
        let inline_simple = child.children().find(|n| is_xs(n, "simpleType"));
        let (base, facets) = resolve_simple(ctx, type_attr, inline_simple);
        let sql_type = map_simple_type(&base, &facets);
        let column_name = pascal_sanitized(&local_name);
        apply_column_with_checks(model, parent_idx, &column_name, sql_type, nullable, &facets, base == "ID");
    }

    Ok(())
}

fn ensure_parent_fk(model: &mut Model, child_idx: usize, parent_idx: usize) {
    let parent_name = model.table(parent_idx).name.clone();
    let fk_col = format!("{parent_name}Id");
    if model.table(child_idx).has_column(&fk_col) {
        return;
    }
    let ref_column = model.table(parent_idx).pk_name();
    let child_table = model.table_mut(child_idx);
    child_table.columns.insert(
        1.min(child_table.columns.len()),
        Column {
            name: fk_col.clone(),
            sql_type: SqlType::Int,
            nullable: false,
            identity: false,
            is_primary_key: false,
        },
    );
    let fk_name = format!("FK_{}_{}", child_table.name, parent_name);
    child_table.foreign_keys.push(ForeignKey {
        name: fk_name,
        column_name: fk_col,
        ref_schema: child_table.schema.clone(),
        ref_table: parent_name,
        ref_column,
    });
}

/// Re-export so callers that only need bindings (e.g. the resolver during
/// tests) don't have to reach into `Model` directly.
pub fn bindings(model: &Model) -> &ElementBindings {
    &model.element_bindings
}
