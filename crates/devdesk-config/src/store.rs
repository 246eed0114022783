use std::{
    collections::{BTreeMap, BTreeSet, HashMap, VecDeque},
    sync::Arc,
};

use devdesk_types::ServiceDescriptor;

use crate::ConfigError;

/// Read-only set of service descriptors with a verified acyclic
/// dependency graph.
#[derive(Debug, Clone)]
pub struct DescriptorStore {
    services: BTreeMap<String, Arc<ServiceDescriptor>>,
    order: Vec<String>,
}

impl DescriptorStore {
    /// Validate and freeze a set of descriptors.
    ///
    /// # Errors
    /// Returns a `ConfigError` on duplicate names, dependencies on undeclared
    /// services (including a service depending on itself) or dependency cycles.
    pub fn load(descriptors: Vec<ServiceDescriptor>) -> Result<Self, ConfigError> {
        let mut services = BTreeMap::new();
        for descriptor in descriptors {
            if services.contains_key(&descriptor.name) {
                return Err(ConfigError::DuplicateService(descriptor.name));
            }
            services.insert(descriptor.name.clone(), Arc::new(descriptor));
        }

        for service in services.values() {
            for dependency in &service.deps {
                if dependency == &service.name || !services.contains_key(dependency) {
                    return Err(ConfigError::UnknownDependency {
                        service: service.name.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }

        let order = toposort(&services)?;
        tracing::debug!("Descriptor store loaded with start order {order:?}");

        Ok(Self { services, order })
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<ServiceDescriptor>> {
        self.services.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ServiceDescriptor>> {
        self.services.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.services.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// All services in start order; dependencies always precede dependents
    /// and ties are broken by name.
    #[must_use]
    pub fn order(&self) -> &[String] {
        &self.order
    }

    #[must_use]
    pub fn dependencies_of(&self, name: &str) -> &[String] {
        self.services
            .get(name)
            .map(|service| service.deps.as_slice())
            .unwrap_or(&[])
    }

    /// The requested services plus their transitive dependencies, in start
    /// order. Returns the first unknown name as the error.
    ///
    /// # Errors
    /// Returns the name of a requested service that is not in the store.
    pub fn closure<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<String>, String> {
        let mut wanted = BTreeSet::new();
        let mut to_process: VecDeque<&str> = VecDeque::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            if !self.services.contains_key(name) {
                return Err(name.to_owned());
            }
            to_process.push_back(name);
        }

        while let Some(name) = to_process.pop_front() {
            if !wanted.insert(name) {
                continue;
            }
            for dependency in self.dependencies_of(name) {
                to_process.push_back(dependency);
            }
        }

        Ok(self
            .order
            .iter()
            .filter(|name| wanted.contains(name.as_str()))
            .cloned()
            .collect())
    }
}

fn toposort(services: &BTreeMap<String, Arc<ServiceDescriptor>>) -> Result<Vec<String>, ConfigError> {
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::with_capacity(services.len());
    let mut deps_count: BTreeMap<&str, usize> = BTreeMap::new();

    for (name, service) in services {
        deps_count.insert(name.as_str(), service.deps.len());
        for dependency in &service.deps {
            dependents
                .entry(dependency.as_str())
                .or_default()
                .push(name.as_str());
        }
    }

    let mut ready: BTreeSet<&str> = deps_count
        .iter()
        .filter_map(|(name, &count)| (count == 0).then_some(*name))
        .collect();

    let mut result = Vec::with_capacity(services.len());
    while let Some(name) = ready.pop_first() {
        result.push(name.to_owned());

        for dependent in dependents.get(name).into_iter().flatten() {
            if let Some(count) = deps_count.get_mut(dependent) {
                *count -= 1;
                if *count == 0 {
                    ready.insert(*dependent);
                }
            }
        }
    }

    if result.len() != services.len() {
        let cycle = deps_count
            .into_iter()
            .filter_map(|(name, count)| (count > 0).then(|| name.to_owned()))
            .collect();
        return Err(ConfigError::CircularDependency(cycle));
    }

    Ok(result)
}
