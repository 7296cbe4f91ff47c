//! Table resolver (spec.md §4.5): `(namespace, localName, parent)` -> table.

use crate::ident::pascal_sanitized;
use crate::model::Model;

/// Resolve the table a given element maps to, following the fallback chain
/// of spec.md §4.5:
///
/// 1. the element-binding map (global elements),
/// 2. `pascal(sanitize(localName))` if that table exists,
/// 3. `pascal(sanitize(parentTable + "_" + localName))` if `parentTable` is
///    given and that compound table exists,
/// 4. `None`.
///
/// When both a direct-name table and a compound `Parent_Child` table exist,
/// the one carrying a `<Parent>Id` column is preferred, disambiguating
/// elements that appear under more than one parent.
pub fn resolve<'m>(model: &'m Model, ns: Option<&str>, local_name: &str, parent_table: Option<&str>) -> Option<&'m str> {
    let key = (ns.map(str::to_string), local_name.to_string());
    if let Some(name) = model.element_bindings.get(&key) {
        return Some(name.as_str());
    }

    let direct = pascal_sanitized(local_name);
    let compound = parent_table.map(|p| pascal_sanitized(&format!("{p}_{local_name}")));

    let direct_table = model.table_by_name(&direct);
    let compound_table = compound.as_deref().and_then(|c| model.table_by_name(c));

    match (direct_table, compound_table, parent_table) {
        (Some(d), Some(c), Some(p)) => {
            let parent_fk = format!("{p}Id");
            if c.has_column(&parent_fk) && !d.has_column(&parent_fk) {
                Some(c.name.as_str())
            } else {
                Some(d.name.as_str())
            }
        }
        (Some(d), None, _) => Some(d.name.as_str()),
        (None, Some(c), _) => Some(c.name.as_str()),
        (None, None, _) => None,
    }
}
