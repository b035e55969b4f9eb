use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One package group, already parsed by the comps-reading front-end.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct PackageGroup {
    /// The group identity, as used in `@id` install arguments.
    pub id: String,
    /// The human-readable group name.
    pub name: String,
    /// Package names always installed with the group.
    pub mandatory_packages: Vec<String>,
    /// Package names installed unless deselected.
    pub default_packages: Vec<String>,
    /// Package names installed only on request.
    pub optional_packages: Vec<String>,
    /// Conditional members: `(package, condition)` pairs where `package` is
    /// only installed once `condition` is (or becomes) installed.
    pub conditional_packages: Vec<(String, String)>,
    /// Whether the group has been selected in this session.
    #[serde(skip)]
    pub selected: bool,
}

impl PackageGroup {
    /// Creates an empty group.
    pub fn new(id: &str, name: &str) -> Self {
        PackageGroup {
            id: id.to_string(),
            name: name.to_string(),
            ..PackageGroup::default()
        }
    }

    /// Returns the names of every package the group mentions, conditional
    /// members included.
    pub fn packages(&self) -> Vec<String> {
        let mut packages = self.mandatory_packages.clone();
        packages.extend(self.default_packages.iter().cloned());
        packages.extend(self.optional_packages.iter().cloned());
        packages.extend(
            self.conditional_packages
                .iter()
                .map(|(package, _)| package.clone()),
        );
        packages
    }
}

/// The merged group metadata of every repository that carries any.
///
/// Parsing and merging comps data is the front-end's job; the core receives
/// the finished composition.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct ComposedGroups {
    groups: BTreeMap<String, PackageGroup>,
}

impl ComposedGroups {
    /// Creates an empty composition.
    pub fn new() -> Self {
        ComposedGroups::default()
    }

    /// Adds a group; with `overwrite` a later definition replaces an
    /// earlier one, otherwise the first definition wins.
    pub fn add_group(&mut self, group: PackageGroup, overwrite: bool) {
        if overwrite || !self.groups.contains_key(&group.id) {
            self.groups.insert(group.id.clone(), group);
        }
    }

    /// Returns whether a group with the given identity exists.
    pub fn has_group(&self, id: &str) -> bool {
        self.groups.contains_key(id)
    }

    /// Returns the group with the given identity.
    pub fn return_group(&self, id: &str) -> Option<&PackageGroup> {
        self.groups.get(id)
    }

    /// Returns the group with the given identity for modification.
    pub fn return_group_mut(&mut self, id: &str) -> Option<&mut PackageGroup> {
        self.groups.get_mut(id)
    }

    /// Returns all groups in identity order.
    pub fn groups(&self) -> impl Iterator<Item = &PackageGroup> {
        self.groups.values()
    }

    /// Returns the number of groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Returns whether the composition holds no groups.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shells() -> PackageGroup {
        let mut group = PackageGroup::new("shells", "Shells");
        group.mandatory_packages.push("bash".to_string());
        group.default_packages.push("zsh".to_string());
        group.optional_packages.push("fish".to_string());
        group
            .conditional_packages
            .push(("zsh-doc".to_string(), "zsh".to_string()));
        group
    }

    #[test]
    fn packages_cover_all_classes() {
        assert_eq!(shells().packages(), ["bash", "zsh", "fish", "zsh-doc"]);
    }

    #[test]
    fn first_definition_wins_without_overwrite() {
        let mut groups = ComposedGroups::new();
        groups.add_group(shells(), false);
        let mut second = PackageGroup::new("shells", "Other shells");
        second.mandatory_packages.push("dash".to_string());
        groups.add_group(second.clone(), false);
        assert_eq!(groups.return_group("shells").unwrap().name, "Shells");

        groups.add_group(second, true);
        assert_eq!(groups.return_group("shells").unwrap().name, "Other shells");
    }
}
