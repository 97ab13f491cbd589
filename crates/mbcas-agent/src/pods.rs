use mbcas_core::{Pod, PodPolicy, PodRef};
use std::collections::BTreeMap;

/// A managed pod's identity, policy, and primary-container CPU request, as
/// read off the platform's pod object. Pods without the managed label are
/// filtered out before this runs.
#[derive(Debug, Clone)]
pub struct ManagedPod {
    pub pod_ref: PodRef,
    pub policy: PodPolicy,
    pub request_mc: i64,
}

/// Extract a `ManagedPod` from a platform `Pod`, or `None` if it isn't
/// opted in, is missing identity fields, or carries no primary container.
pub fn extract_managed(pod: &Pod) -> Option<ManagedPod> {
    let labels = map_from(pod.metadata.labels.as_ref());
    let annotations = map_from(pod.metadata.annotations.as_ref());

    if !PodPolicy::is_managed(&annotations, &labels) {
        return None;
    }

    let namespace = pod.metadata.namespace.clone()?;
    let name = pod.metadata.name.clone()?;
    let uid = pod.metadata.uid.clone()?;
    let policy = PodPolicy::from_annotations(&annotations);

    let container = pod.spec.as_ref()?.containers.first()?;
    let request_mc = container
        .resources
        .as_ref()
        .and_then(|r| r.requests.as_ref())
        .and_then(|r| r.get("cpu"))
        .and_then(|q| mbcas_core::quantities::parse_millicores(&q.0).ok())
        .unwrap_or(0);

    Some(ManagedPod {
        pod_ref: PodRef::new(namespace, name, uid),
        policy,
        request_mc,
    })
}

fn map_from(src: Option<&std::collections::BTreeMap<String, String>>) -> BTreeMap<String, String> {
    src.cloned().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mbcas_core::k8s_openapi::api::core::v1::{Container, PodSpec, ResourceRequirements};
    use mbcas_core::k8s_openapi::apimachinery::pkg::api::resource::Quantity;

    fn managed_pod_with_request(request: &str) -> Pod {
        let mut pod = Pod::default();
        pod.metadata.namespace = Some("default".into());
        pod.metadata.name = Some("web".into());
        pod.metadata.uid = Some("uid-1".into());
        pod.metadata.labels = Some(BTreeMap::from([("mbcas.io/managed".to_string(), "true".to_string())]));

        let mut container = Container::default();
        let mut resources = ResourceRequirements::default();
        resources.requests = Some(BTreeMap::from([("cpu".to_string(), Quantity(request.to_string()))]));
        container.resources = Some(resources);

        pod.spec = Some(PodSpec {
            containers: vec![container],
            ..Default::default()
        });
        pod
    }

    #[test]
    fn unmanaged_pod_is_filtered_out() {
        let mut pod = managed_pod_with_request("300m");
        pod.metadata.labels = None;
        assert!(extract_managed(&pod).is_none());
    }

    #[test]
    fn managed_pod_extracts_request_and_identity() {
        let pod = managed_pod_with_request("300m");
        let managed = extract_managed(&pod).unwrap();
        assert_eq!(managed.pod_ref.namespace, "default");
        assert_eq!(managed.request_mc, 300);
    }

    #[test]
    fn missing_container_yields_none() {
        let mut pod = managed_pod_with_request("300m");
        pod.spec.as_mut().unwrap().containers.clear();
        assert!(extract_managed(&pod).is_none());
    }
}
