//! Molecule catalogue.
//!
//! A molecule describes one RDF shape independently of where it is stored: its predicates
//! (optionally with the molecules their objects range over), the molecules it links to and the
//! wrappers (physical sources) serving subsets of its predicates.
//!
//! The catalogue is built once from a list of molecule templates and is read only afterwards.
//! Reloading builds a new catalogue and swaps it into a [`CatalogueHandle`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::{bail, Context};
use itertools::Itertools;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};

use crate::error::{DecomposeError, DecomposeResult};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredicateEntry {
    pub predicate: String,
    /// Molecules the objects of this predicate belong to.
    #[serde(default)]
    pub range: Vec<String>,
}

/// A physical source serving some predicates of a molecule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wrapper {
    pub url: String,
    #[serde(default)]
    pub wrapper_type: String,
    #[serde(default)]
    pub predicates: Vec<String>,
}

impl Wrapper {
    pub fn serves(&self, predicate: &str) -> bool {
        self.predicates.iter().any(|p| p == predicate)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Molecule {
    pub root_type: String,
    #[serde(default)]
    pub linked_to: Vec<String>,
    #[serde(default)]
    pub predicates: Vec<PredicateEntry>,
    #[serde(default)]
    pub wrappers: Vec<Wrapper>,
}

impl Molecule {
    pub fn predicate_uris(&self) -> impl Iterator<Item = &str> {
        self.predicates.iter().map(|p| p.predicate.as_str())
    }

    pub fn has_predicate(&self, predicate: &str) -> bool {
        self.predicate_uris().any(|p| p == predicate)
    }

    /// Declared range of `predicate`, empty when unknown.
    pub fn range_of(&self, predicate: &str) -> &[String] {
        self.predicates
            .iter()
            .find(|p| p.predicate == predicate)
            .map(|p| p.range.as_slice())
            .unwrap_or_default()
    }

    /// Merges another template with the same root type into this one.
    fn merge(&mut self, other: Molecule) {
        for link in other.linked_to {
            if !self.linked_to.contains(&link) {
                self.linked_to.push(link);
            }
        }

        for entry in other.predicates {
            match self
                .predicates
                .iter_mut()
                .find(|p| p.predicate == entry.predicate)
            {
                Some(existing) => {
                    for r in entry.range {
                        if !existing.range.contains(&r) {
                            existing.range.push(r);
                        }
                    }
                }
                None => self.predicates.push(entry),
            }
        }

        for wrapper in other.wrappers {
            match self
                .wrappers
                .iter_mut()
                .find(|w| w.url == wrapper.url && w.wrapper_type == wrapper.wrapper_type)
            {
                Some(existing) => {
                    for p in wrapper.predicates {
                        if !existing.predicates.contains(&p) {
                            existing.predicates.push(p);
                        }
                    }
                }
                None => self.wrappers.push(wrapper),
            }
        }
    }

    /// Declared predicates no wrapper of this molecule serves.
    fn unserved_predicates(&self) -> Vec<&str> {
        self.predicate_uris()
            .filter(|p| !self.wrappers.iter().any(|w| w.serves(p)))
            .collect()
    }
}

/// Indexed, read only molecule metadata.
#[derive(Debug, Default)]
pub struct Catalogue {
    molecules: BTreeMap<String, Molecule>,
    /// predicate -> molecules offering it
    predicate_index: HashMap<String, BTreeSet<String>>,
    /// predicate -> urls of wrappers serving it
    predicate_wrapper_index: HashMap<String, BTreeSet<String>>,
}

impl Catalogue {
    /// Builds a catalogue from molecule templates, merging templates with the same root type.
    pub fn try_new<I: IntoIterator<Item = Molecule>>(templates: I) -> anyhow::Result<Self> {
        let mut molecules = BTreeMap::<String, Molecule>::new();
        for template in templates {
            if template.root_type.is_empty() {
                bail!("Molecule template without root type: {:?}", template);
            }
            match molecules.get_mut(&template.root_type) {
                Some(existing) => existing.merge(template),
                None => {
                    molecules.insert(template.root_type.clone(), template);
                }
            }
        }

        for molecule in molecules.values() {
            let unserved = molecule.unserved_predicates();
            if !molecule.wrappers.is_empty() && !unserved.is_empty() {
                bail!(
                    "Molecule {} declares predicates {:?} that none of its wrappers serve",
                    molecule.root_type,
                    unserved
                );
            }
        }

        let mut predicate_index = HashMap::<String, BTreeSet<String>>::new();
        let mut predicate_wrapper_index = HashMap::<String, BTreeSet<String>>::new();
        for (name, molecule) in &molecules {
            for p in molecule.predicate_uris() {
                predicate_index
                    .entry(p.to_string())
                    .or_default()
                    .insert(name.clone());
            }
            for wrapper in &molecule.wrappers {
                for p in &wrapper.predicates {
                    predicate_wrapper_index
                        .entry(p.clone())
                        .or_default()
                        .insert(wrapper.url.clone());
                }
            }
        }

        Ok(Self {
            molecules,
            predicate_index,
            predicate_wrapper_index,
        })
    }

    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        let templates: Vec<Molecule> =
            serde_json::from_str(json).context("Failed to parse molecule templates")?;
        Self::try_new(templates)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open molecule templates file: {:?}", path))?;
        let templates: Vec<Molecule> = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse molecule templates file: {:?}", path))?;
        let catalogue = Self::try_new(templates)
            .with_context(|| format!("Invalid molecule templates in {:?}", path))?;
        info!(
            "Loaded {} molecules from {:?}: {}",
            catalogue.len(),
            path,
            catalogue.molecules.keys().join(", ")
        );
        Ok(catalogue)
    }

    /// Loads a catalogue, falling back to an empty one when the file can't be used.
    ///
    /// Every decomposition against an empty catalogue fails as unsatisfiable.
    pub fn load_or_empty<P: AsRef<Path>>(path: P) -> Self {
        Self::from_json_file(path).unwrap_or_else(|e| {
            error!("Exception while reading molecule templates: {:?}", e);
            Self::default()
        })
    }

    pub fn len(&self) -> usize {
        self.molecules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.molecules.is_empty()
    }

    pub fn molecule(&self, name: &str) -> Option<&Molecule> {
        self.molecules.get(name)
    }

    pub(crate) fn try_molecule(&self, name: &str) -> DecomposeResult<&Molecule> {
        self.molecule(name)
            .ok_or_else(|| DecomposeError::UnknownMolecule(name.to_string()))
    }

    pub fn molecule_names(&self) -> impl Iterator<Item = &str> {
        self.molecules.keys().map(String::as_str)
    }

    /// Molecules offering every one of `predicates`.
    ///
    /// Empty if any predicate is unknown or `predicates` is empty.
    pub fn molecules_for_predicates<S: AsRef<str>>(&self, predicates: &[S]) -> BTreeSet<String> {
        let mut sets = predicates.iter().map(|p| self.predicate_index.get(p.as_ref()));
        let first = match sets.next() {
            Some(Some(first)) => first.clone(),
            _ => return BTreeSet::new(),
        };
        sets.try_fold(first, |acc, set| {
            set.map(|s| acc.intersection(s).cloned().collect())
        })
        .unwrap_or_default()
    }

    /// Molecules offering `predicate`.
    pub fn molecules_for_predicate(&self, predicate: &str) -> Vec<&str> {
        self.predicate_index
            .get(predicate)
            .map(|mols| mols.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// For every molecule offering some of `predicates`, the ones it offers.
    ///
    /// Empty if the molecules together don't cover all of `predicates`.
    pub fn predicates_per_molecule<S: AsRef<str>>(
        &self,
        predicates: &[S],
    ) -> BTreeMap<String, Vec<String>> {
        let mut per_molecule = BTreeMap::<String, Vec<String>>::new();
        let mut covered = BTreeSet::new();
        for p in predicates {
            let p = p.as_ref();
            if let Some(mols) = self.predicate_index.get(p) {
                covered.insert(p);
                for m in mols {
                    let preds = per_molecule.entry(m.clone()).or_default();
                    if !preds.iter().any(|existing| existing == p) {
                        preds.push(p.to_string());
                    }
                }
            }
        }

        let wanted = predicates.iter().map(AsRef::as_ref).collect::<BTreeSet<_>>();
        if covered != wanted {
            debug!(
                "Predicates {:?} are not offered by any molecule",
                wanted.difference(&covered).collect::<Vec<_>>()
            );
            return BTreeMap::new();
        }
        per_molecule
    }

    /// Urls of wrappers serving `predicate`.
    pub fn wrappers_for_predicate(&self, predicate: &str) -> Option<&BTreeSet<String>> {
        self.predicate_wrapper_index.get(predicate)
    }
}

/// Shared access to the current catalogue.
///
/// Decompositions work on a snapshot, a reload swaps in a fully built catalogue so readers never
/// observe a partially built index.
#[derive(Debug, Default)]
pub struct CatalogueHandle {
    current: RwLock<Arc<Catalogue>>,
}

impl CatalogueHandle {
    pub fn new(catalogue: Catalogue) -> Self {
        Self {
            current: RwLock::new(Arc::new(catalogue)),
        }
    }

    pub fn snapshot(&self) -> Arc<Catalogue> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swaps in `catalogue`, returning the previous one.
    pub fn replace(&self, catalogue: Catalogue) -> Arc<Catalogue> {
        let mut current = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *current, Arc::new(catalogue))
    }

    /// Rebuilds the catalogue from `path` and swaps it in.
    ///
    /// On failure the current catalogue stays in place.
    pub fn reload<P: AsRef<Path>>(&self, path: P) -> DecomposeResult<()> {
        let catalogue = Catalogue::from_json_file(path)?;
        self.replace(catalogue);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{company_person_catalogue, wrapper};
    use maplit::btreeset;

    const MERGED_TEMPLATES: &str = r#"[
        {
            "rootType": "http://ex.org/Person",
            "linkedTo": ["http://ex.org/Company"],
            "predicates": [
                {"predicate": "http://ex.org/name", "range": []},
                {"predicate": "http://ex.org/worksAt", "range": ["http://ex.org/Company"]}
            ],
            "wrappers": [
                {"url": "http://w1", "wrapperType": "SPARQL_Endpoint",
                 "predicates": ["http://ex.org/name", "http://ex.org/worksAt"]}
            ]
        },
        {
            "rootType": "http://ex.org/Person",
            "linkedTo": ["http://ex.org/City"],
            "predicates": [
                {"predicate": "http://ex.org/worksAt", "range": ["http://ex.org/Org"]},
                {"predicate": "http://ex.org/livesIn", "range": ["http://ex.org/City"]}
            ],
            "wrappers": [
                {"url": "http://w1", "wrapperType": "SPARQL_Endpoint",
                 "predicates": ["http://ex.org/livesIn"]},
                {"url": "http://w3", "wrapperType": "SPARQL_Endpoint",
                 "predicates": ["http://ex.org/name"]}
            ]
        }
    ]"#;

    #[test]
    fn test_merge_by_root_type() {
        let catalogue = Catalogue::from_json_str(MERGED_TEMPLATES).unwrap();
        assert_eq!(1, catalogue.len());

        let person = catalogue.molecule("http://ex.org/Person").unwrap();
        assert_eq!(
            vec!["http://ex.org/Company", "http://ex.org/City"],
            person.linked_to
        );
        assert_eq!(
            &["http://ex.org/Company".to_string(), "http://ex.org/Org".to_string()],
            person.range_of("http://ex.org/worksAt")
        );
        assert_eq!(3, person.predicates.len());
        assert_eq!(2, person.wrappers.len());
        assert_eq!(
            vec![
                "http://ex.org/name",
                "http://ex.org/worksAt",
                "http://ex.org/livesIn"
            ],
            person.wrappers[0].predicates
        );
        assert_eq!(
            Some(&btreeset!["http://w1".to_string(), "http://w3".to_string()]),
            catalogue.wrappers_for_predicate("http://ex.org/name")
        );
    }

    #[test]
    fn test_unserved_predicate_is_rejected() {
        let templates = vec![Molecule {
            root_type: "http://ex.org/A".to_string(),
            linked_to: vec![],
            predicates: vec![
                PredicateEntry {
                    predicate: "http://ex.org/p1".to_string(),
                    range: vec![],
                },
                PredicateEntry {
                    predicate: "http://ex.org/p2".to_string(),
                    range: vec![],
                },
            ],
            wrappers: vec![wrapper("http://wa", &["http://ex.org/p1"])],
        }];

        assert!(Catalogue::try_new(templates).is_err());
    }

    #[test]
    fn test_predicate_lookups() {
        let catalogue = company_person_catalogue();

        assert_eq!(
            btreeset!["http://ex.org/Company".to_string(), "http://ex.org/Person".to_string()],
            catalogue.molecules_for_predicates(&["http://ex.org/name"])
        );
        assert_eq!(
            btreeset!["http://ex.org/Person".to_string()],
            catalogue.molecules_for_predicates(&["http://ex.org/name", "http://ex.org/worksAt"])
        );
        assert!(catalogue
            .molecules_for_predicates(&["http://ex.org/name", "http://ex.org/unknown"])
            .is_empty());

        let per_molecule = catalogue
            .predicates_per_molecule(&["http://ex.org/worksAt", "http://ex.org/founded"]);
        assert_eq!(
            vec!["http://ex.org/founded".to_string()],
            per_molecule["http://ex.org/Company"]
        );
        assert_eq!(
            vec!["http://ex.org/worksAt".to_string()],
            per_molecule["http://ex.org/Person"]
        );
        assert!(catalogue
            .predicates_per_molecule(&["http://ex.org/worksAt", "http://ex.org/unknown"])
            .is_empty());
    }

    #[test]
    fn test_load_failure_yields_empty_catalogue() {
        let catalogue = Catalogue::load_or_empty("/nonexistent/templates.json");
        assert!(catalogue.is_empty());
        assert!(catalogue
            .molecules_for_predicates(&["http://ex.org/name"])
            .is_empty());
    }

    #[test]
    fn test_handle_swaps_catalogue() {
        let handle = CatalogueHandle::new(Catalogue::default());
        let before = handle.snapshot();

        handle.replace(company_person_catalogue());

        assert!(before.is_empty());
        assert_eq!(2, handle.snapshot().len());
        assert!(handle.reload("/nonexistent/templates.json").is_err());
        assert_eq!(2, handle.snapshot().len());
    }
}
