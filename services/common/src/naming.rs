//! Deterministic names for hub-side proxy objects

/// Suffix appended to the proxy name for the EndpointSlice.
pub const ENDPOINT_SLICE_SUFFIX: &str = "-endpoint-slice";

/// Service names are DNS-1035 labels.
pub const MAX_PROXY_NAME_LEN: usize = 63;

/// `{cluster_id}-{namespace}-{service_name}`
pub fn proxy_name(cluster_id: &str, namespace: &str, service_name: &str) -> String {
    format!("{}-{}-{}", cluster_id, namespace, service_name)
}

/// Name of the EndpointSlice that belongs to `proxy`.
pub fn endpoint_slice_name(proxy: &str) -> String {
    format!("{}{}", proxy, ENDPOINT_SLICE_SUFFIX)
}
