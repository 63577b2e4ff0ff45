//! Family, type and parameter listings served to the client.

use tether_core::{Category, FamilyRef, ParameterInfo};

use crate::document::{HostDocument, SystemKind};
use crate::error::HostError;

/// System families always offered alongside the loaded ones.
pub const SYSTEM_FAMILIES: &[(&str, &str)] = &[
    ("Walls", "Basic Wall"),
    ("Walls", "Curtain Wall"),
    ("Walls", "Stacked Wall"),
    ("Floors", "Floor"),
    ("Roofs", "Roof"),
];

/// Loaded families plus the system families, sorted by family name.
pub fn family_names<D: HostDocument + ?Sized>(doc: &D) -> Vec<FamilyRef> {
    let mut names = doc.families();
    names.extend(
        SYSTEM_FAMILIES
            .iter()
            .map(|(category, family)| FamilyRef::new(*category, *family)),
    );
    names.sort_by(|a, b| a.family_name.cmp(&b.family_name));
    names
}

/// Type names of a family; system categories list every type of their kind.
pub fn type_names<D: HostDocument + ?Sized>(
    doc: &D,
    family: &FamilyRef,
) -> Result<Vec<String>, HostError> {
    match family.category {
        Category::Walls => Ok(doc.system_types(SystemKind::Wall)),
        Category::Floors => Ok(doc.system_types(SystemKind::Floor)),
        Category::Roofs => Ok(doc.system_types(SystemKind::Roof)),
        Category::Family(_) => doc.family_types(&family.family_name),
    }
}

/// Type-level parameters by name, then instance-level parameters by name.
pub fn parameters<D: HostDocument + ?Sized>(
    doc: &D,
    family: &FamilyRef,
    type_name: &str,
) -> Result<Vec<ParameterInfo>, HostError> {
    let mut params = doc.parameter_definitions(family, type_name)?;
    params.sort_by(|a, b| b.is_type.cmp(&a.is_type).then_with(|| a.name.cmp(&b.name)));
    Ok(params)
}
