//! Conversion from GitHub API types to catalog and tree types.

use chrono::{DateTime, Utc};

use crate::catalog::{RepositoryEntry, Visibility};
use crate::source::{GitRef, TreeEntry, TreeEntryKind};

use super::types::{ApiGitCommit, ApiRef, ApiRepository, ApiTreeEntry};

/// Determine visibility from a GitHub repository.
///
/// GitHub can return "public", "private", or "internal" (GitHub Enterprise only).
/// Older API versions omit `visibility` and only set `private`.
fn github_visibility(repo: &ApiRepository) -> Visibility {
    match repo.visibility.as_deref() {
        Some("internal") => Visibility::Internal,
        Some("private") => Visibility::Private,
        Some("public") => Visibility::Public,
        _ if repo.private => Visibility::Private,
        _ => Visibility::Public,
    }
}

/// Convert a GitHub repository to a catalog entry.
///
/// `last_modified` is the newest of `pushed_at` and `updated_at`, so both code
/// pushes and metadata edits advance it.
pub fn to_repository_entry(repo: &ApiRepository) -> RepositoryEntry {
    let created_at = repo.created_at.unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
    let last_modified = [repo.pushed_at, repo.updated_at]
        .into_iter()
        .flatten()
        .max()
        .unwrap_or(created_at);

    RepositoryEntry {
        owner: repo.owner.login.clone(),
        name: repo.name.clone(),
        default_branch: repo
            .default_branch
            .clone()
            .unwrap_or_else(|| "main".to_string()),
        size_kb: repo.size.unwrap_or(0),
        last_modified,
        created_at,
        visibility: github_visibility(repo),
    }
}

/// Convert a git tree entry. Returns `None` for kinds the filesystem ignores.
pub fn to_tree_entry(entry: &ApiTreeEntry) -> Option<TreeEntry> {
    let kind = match (entry.kind.as_str(), entry.mode.as_str()) {
        ("tree", _) => TreeEntryKind::Tree,
        ("commit", _) => TreeEntryKind::Submodule,
        ("blob", "120000") => TreeEntryKind::Symlink,
        ("blob", _) => TreeEntryKind::Blob,
        _ => return None,
    };

    Some(TreeEntry {
        path: entry.path.clone(),
        kind,
        sha: entry.sha.clone(),
        size: entry.size.unwrap_or(0),
    })
}

pub fn to_git_ref(api: &ApiRef) -> GitRef {
    GitRef::new(api.name.clone(), api.commit.sha.clone())
}

/// When a commit was authored, falling back to when it was committed.
pub fn commit_time(commit: &ApiGitCommit) -> Option<DateTime<Utc>> {
    [&commit.author, &commit.committer]
        .into_iter()
        .flatten()
        .find_map(|signature| signature.date)
}
