//! Isolation filters: keeping images, tenants and image properties on the
//! hosts set aside for them.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;
use warpgrid_state::{HostDirectory, HostState};

use super::HostFilter;
use crate::config::FilterConfig;
use crate::error::FilterResult;
use crate::request::PlacementRequest;

/// Aggregate metadata key listing the projects an aggregate is reserved for.
pub const TENANT_METADATA_KEY: &str = "filter_tenant_id";

/// Keeps isolated images on isolated hosts, and, when restricted, keeps
/// isolated hosts for isolated images only.
#[derive(Debug, Clone)]
pub struct IsolatedHostsFilter {
    hosts: BTreeSet<String>,
    images: BTreeSet<String>,
    restrict: bool,
}

impl IsolatedHostsFilter {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            hosts: config.isolated_hosts.iter().cloned().collect(),
            images: config.isolated_images.iter().cloned().collect(),
            restrict: config.restrict_isolated_hosts_to_isolated_images,
        }
    }
}

impl HostFilter for IsolatedHostsFilter {
    fn name(&self) -> &'static str {
        "IsolatedHostsFilter"
    }

    fn host_passes(&self, host: &mut HostState, request: &PlacementRequest) -> FilterResult<bool> {
        if self.hosts.is_empty() && self.images.is_empty() {
            return Ok(true);
        }

        let host_isolated = self.hosts.contains(&host.host);
        let image_isolated = request
            .image
            .id
            .as_ref()
            .is_some_and(|id| self.images.contains(id));

        let passes = if self.restrict {
            host_isolated == image_isolated
        } else {
            !image_isolated || host_isolated
        };
        if !passes {
            debug!(
                host = %host.host,
                filter = self.name(),
                host_isolated,
                image_isolated,
                "isolation mismatch"
            );
        }
        Ok(passes)
    }
}

/// Hosts in an aggregate carrying `filter_tenant_id` only take instances of
/// the listed projects.
#[derive(Clone)]
pub struct AggregateMultiTenancyIsolation {
    directory: Arc<dyn HostDirectory>,
}

impl AggregateMultiTenancyIsolation {
    pub fn new(directory: Arc<dyn HostDirectory>) -> Self {
        Self { directory }
    }
}

impl HostFilter for AggregateMultiTenancyIsolation {
    fn name(&self) -> &'static str {
        "AggregateMultiTenancyIsolation"
    }

    fn host_passes(&self, host: &mut HostState, request: &PlacementRequest) -> FilterResult<bool> {
        let metadata = self
            .directory
            .metadata_for_host(&host.host, Some(TENANT_METADATA_KEY))?;
        let Some(tenants) = metadata.get(TENANT_METADATA_KEY) else {
            return Ok(true);
        };

        let passes = tenants.contains(&request.context.project_id);
        if !passes {
            debug!(
                host = %host.host,
                filter = self.name(),
                project = %request.context.project_id,
                "host reserved for other tenants"
            );
        }
        Ok(passes)
    }
}

/// Image properties must agree with the metadata of the host's aggregates.
#[derive(Clone)]
pub struct AggregateImagePropertiesIsolation {
    directory: Arc<dyn HostDirectory>,
    prefix: Option<String>,
}

impl AggregateImagePropertiesIsolation {
    pub fn new(config: &FilterConfig, directory: Arc<dyn HostDirectory>) -> Self {
        let separator = &config.aggregate_image_properties_isolation_separator;
        let prefix = config
            .aggregate_image_properties_isolation_namespace
            .as_ref()
            .map(|ns| format!("{ns}{separator}"));
        Self { directory, prefix }
    }
}

impl HostFilter for AggregateImagePropertiesIsolation {
    fn name(&self) -> &'static str {
        "AggregateImagePropertiesIsolation"
    }

    fn host_passes(&self, host: &mut HostState, request: &PlacementRequest) -> FilterResult<bool> {
        let metadata = self.directory.metadata_for_host(&host.host, None)?;

        for (key, allowed) in &metadata {
            if let Some(prefix) = &self.prefix {
                if !key.starts_with(prefix.as_str()) {
                    continue;
                }
            }
            match request.image.properties.get(key) {
                Some(value) if !value.is_empty() && !allowed.contains(value) => {
                    debug!(
                        host = %host.host,
                        filter = self.name(),
                        %key,
                        %value,
                        "image property not allowed by aggregate"
                    );
                    return Ok(false);
                }
                _ => {}
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{directory_with, host_state};
    use warpgrid_state::Aggregate;

    fn isolated_request(image: Option<&str>) -> PlacementRequest {
        let mut request = PlacementRequest::default();
        request.image.id = image.map(str::to_string);
        request
    }

    fn isolated_filter(restrict: bool) -> IsolatedHostsFilter {
        IsolatedHostsFilter::new(&FilterConfig {
            isolated_hosts: vec!["isolated_host".into()],
            isolated_images: vec!["isolated_image".into()],
            restrict_isolated_hosts_to_isolated_images: restrict,
            ..FilterConfig::default()
        })
    }

    fn isolated_passes(restrict: bool, host: &str, image: Option<&str>) -> bool {
        let mut host = host_state(host, "node1");
        isolated_filter(restrict)
            .host_passes(&mut host, &isolated_request(image))
            .unwrap()
    }

    #[test]
    fn isolated_hosts_restricted() {
        assert!(isolated_passes(true, "isolated_host", Some("isolated_image")));
        assert!(!isolated_passes(true, "isolated_host", Some("other_image")));
        assert!(!isolated_passes(true, "isolated_host", None));
        assert!(!isolated_passes(true, "other_host", Some("isolated_image")));
        assert!(isolated_passes(true, "other_host", Some("other_image")));
        assert!(isolated_passes(true, "other_host", None));
    }

    #[test]
    fn isolated_hosts_unrestricted() {
        assert!(isolated_passes(false, "isolated_host", Some("isolated_image")));
        assert!(isolated_passes(false, "isolated_host", Some("other_image")));
        assert!(isolated_passes(false, "isolated_host", None));
        assert!(!isolated_passes(false, "other_host", Some("isolated_image")));
        assert!(isolated_passes(false, "other_host", Some("other_image")));
    }

    #[test]
    fn isolated_hosts_noop_when_unconfigured() {
        let filter = IsolatedHostsFilter::new(&FilterConfig::default());
        let mut host = host_state("isolated_host", "node1");
        let request = isolated_request(Some("isolated_image"));
        assert!(filter.host_passes(&mut host, &request).unwrap());
    }

    fn tenant_request(project: &str) -> PlacementRequest {
        let mut request = PlacementRequest::default();
        request.context.project_id = project.to_string();
        request
    }

    fn tenant_passes(filter: &AggregateMultiTenancyIsolation, project: &str) -> bool {
        let mut host = host_state("host1", "node1");
        let request = tenant_request(project);
        filter.host_passes(&mut host, &request).unwrap()
    }

    #[test]
    fn multi_tenancy_restricts_to_listed_projects() {
        let reserved = Aggregate::new("reserved")
            .with_host("host1")
            .with_metadata(TENANT_METADATA_KEY, "my_tenantid");
        let filter = AggregateMultiTenancyIsolation::new(directory_with(vec![reserved]));

        assert!(tenant_passes(&filter, "my_tenantid"));
        assert!(!tenant_passes(&filter, "other"));
    }

    #[test]
    fn multi_tenancy_unrestricted_without_metadata() {
        let plain = Aggregate::new("plain")
            .with_host("host1")
            .with_metadata("foo", "bar");
        let filter = AggregateMultiTenancyIsolation::new(directory_with(vec![plain]));

        assert!(tenant_passes(&filter, "anyone"));
    }

    #[test]
    fn multi_tenancy_accepts_any_listed_aggregate() {
        let directory = directory_with(vec![
            Aggregate::new("a")
                .with_host("host1")
                .with_metadata(TENANT_METADATA_KEY, "t1"),
            Aggregate::new("b")
                .with_host("host1")
                .with_metadata(TENANT_METADATA_KEY, "t2"),
        ]);
        let filter = AggregateMultiTenancyIsolation::new(directory);

        assert!(tenant_passes(&filter, "t2"));
    }

    fn image_filter(
        namespace: Option<&str>,
        aggregates: Vec<Aggregate>,
    ) -> AggregateImagePropertiesIsolation {
        let config = FilterConfig {
            aggregate_image_properties_isolation_namespace: namespace.map(str::to_string),
            ..FilterConfig::default()
        };
        AggregateImagePropertiesIsolation::new(&config, directory_with(aggregates))
    }

    fn image_passes(filter: &AggregateImagePropertiesIsolation, props: &[(&str, &str)]) -> bool {
        let mut request = PlacementRequest::default();
        let properties = &mut request.image.properties;
        for (k, v) in props {
            properties.insert(k.to_string(), v.to_string());
        }
        let mut host = host_state("host1", "node1");
        filter.host_passes(&mut host, &request).unwrap()
    }

    fn tagged(name: &str, key: &str, value: &str) -> Aggregate {
        Aggregate::new(name)
            .with_host("host1")
            .with_metadata(key, value)
    }

    #[test]
    fn image_properties_must_match_aggregate() {
        let filter = image_filter(None, vec![tagged("a", "foo", "bar")]);
        assert!(image_passes(&filter, &[("foo", "bar")]));
        assert!(!image_passes(&filter, &[("foo", "baz")]));
        // Properties the aggregate does not mention are unconstrained.
        assert!(image_passes(&filter, &[("other", "x")]));
        assert!(image_passes(&filter, &[]));
    }

    #[test]
    fn image_properties_union_across_aggregates() {
        let aggregates = vec![tagged("a", "foo", "bar"), tagged("b", "foo", "baz")];
        let filter = image_filter(None, aggregates);
        assert!(image_passes(&filter, &[("foo", "baz")]));
        assert!(!image_passes(&filter, &[("foo", "qux")]));
    }

    #[test]
    fn image_properties_namespace_skips_other_keys() {
        let aggregate = tagged("a", "np.foo", "bar").with_metadata("foo", "bar");
        let filter = image_filter(Some("np"), vec![aggregate]);
        assert!(image_passes(&filter, &[("foo", "other")]));
        assert!(!image_passes(&filter, &[("np.foo", "other")]));
        assert!(image_passes(&filter, &[("np.foo", "bar")]));
    }
}
