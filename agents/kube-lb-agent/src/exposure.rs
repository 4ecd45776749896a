//! Service exposure classes

use std::fmt;
use std::str::FromStr;

use k8s_openapi::api::core::v1::Service;

/// `spec.type` of a Service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExposureClass {
    ClusterIp,
    NodePort,
    LoadBalancer,
    ExternalName,
}

/// A `spec.type` value the agent does not know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownClass(pub String);

impl FromStr for ExposureClass {
    type Err = UnknownClass;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ClusterIP" => Ok(ExposureClass::ClusterIp),
            "NodePort" => Ok(ExposureClass::NodePort),
            "LoadBalancer" => Ok(ExposureClass::LoadBalancer),
            "ExternalName" => Ok(ExposureClass::ExternalName),
            other => Err(UnknownClass(other.to_string())),
        }
    }
}

impl fmt::Display for ExposureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExposureClass::ClusterIp => write!(f, "ClusterIP"),
            ExposureClass::NodePort => write!(f, "NodePort"),
            ExposureClass::LoadBalancer => write!(f, "LoadBalancer"),
            ExposureClass::ExternalName => write!(f, "ExternalName"),
        }
    }
}

impl ExposureClass {
    /// Class of `svc`; an unset type is `ClusterIP`, as the API server defaults it.
    pub fn of(svc: &Service) -> Result<Self, UnknownClass> {
        match svc.spec.as_ref().and_then(|s| s.type_.as_deref()) {
            None => Ok(ExposureClass::ClusterIp),
            Some(t) => t.parse(),
        }
    }

    pub fn needs_external_address(self) -> bool {
        self == ExposureClass::LoadBalancer
    }
}
