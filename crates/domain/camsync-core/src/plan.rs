use crate::{LocalFileSet, RemoteFileEntry, SyncPlan};
use camino::Utf8Path;

/// Last path component of a camera-relative URI.
///
/// `None` for URIs that end in `..` or have no components at all.
pub fn basename(uri: &str) -> Option<&str> {
    Utf8Path::new(uri).file_name().filter(|name| !name.is_empty())
}

/// Reconcile a remote listing against the local directory snapshot.
///
/// Every remote basename missing from `local` ends up in the plan. When two
/// URIs share a basename the one listed last wins.
pub fn plan<I, S>(remote_uris: I, local: &LocalFileSet) -> SyncPlan
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    remote_uris
        .into_iter()
        .filter_map(|uri| RemoteFileEntry::from_uri(uri.as_ref()))
        .filter(|entry| !local.contains(&entry.name))
        .collect()
}

/// Number of distinct basenames in a listing, ignoring local state.
pub fn unique_remote_names<I, S>(remote_uris: I) -> usize
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    plan(remote_uris, &LocalFileSet::new()).len()
}
