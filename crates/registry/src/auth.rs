//! Registry authentication.
//!
//! Credential loading and keychain integration are external collaborators
//! per spec.md §1; this module only covers the minimal environment-based
//! lookup the teacher's own OCI tooling uses, as a default that real
//! deployments are expected to replace.

use oci_distribution::secrets::RegistryAuth;

/// Resolve credentials for a registry host.
///
/// Currently checks `GHCR`/`GH_TOKEN` for `ghcr.io`, matching the
/// teacher's `OciClient::get_auth`, and otherwise falls back to
/// anonymous access.
#[must_use]
pub fn auth_for_host(host: &str) -> RegistryAuth {
    if host == "ghcr.io" {
        if let Ok(token) = std::env::var("GITHUB_TOKEN") {
            return RegistryAuth::Basic(String::new(), token);
        }
        if let Ok(token) = std::env::var("GH_TOKEN") {
            return RegistryAuth::Basic(String::new(), token);
        }
    }
    RegistryAuth::Anonymous
}
