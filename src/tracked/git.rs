//! git2 plumbing for tracked-repo clones.

use std::path::Path;

use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{
    BranchType, Cred, CredentialType, FetchOptions, Oid, RemoteCallbacks, Repository, ResetType,
    StatusOptions,
};
use tracing::{debug, info};

use crate::error::{Result, SksError};

const REMOTE: &str = "origin";
const MAX_CREDENTIAL_ATTEMPTS: usize = 3;

/// Fetch options with credential callbacks: ssh agent for ssh URLs, the
/// configured credential helper for https, default credentials otherwise.
fn fetch_options<'a>() -> FetchOptions<'a> {
    let mut attempts = 0usize;
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(move |url, username, allowed| {
        attempts += 1;
        if attempts > MAX_CREDENTIAL_ATTEMPTS {
            return Err(git2::Error::from_str("authentication failed"));
        }
        if allowed.contains(CredentialType::SSH_KEY) {
            if let Some(user) = username {
                return Cred::ssh_key_from_agent(user);
            }
        }
        if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) {
            if let Ok(config) = git2::Config::open_default() {
                return Cred::credential_helper(&config, url, username);
            }
        }
        Cred::default()
    });
    let mut options = FetchOptions::new();
    options.remote_callbacks(callbacks);
    options
}

/// Clone `url` into `path`, optionally checking out `branch`.
pub fn clone_repo(url: &str, path: &Path, branch: Option<&str>) -> Result<Repository> {
    let mut builder = RepoBuilder::new();
    builder.fetch_options(fetch_options());
    if let Some(branch) = branch {
        builder.branch(branch);
    }
    let repo = builder
        .clone(url, path)
        .map_err(|err| SksError::GitOperationFailed(format!("clone {url}: {}", err.message())))?;
    info!(url, path = %path.display(), "cloned tracked repo");
    Ok(repo)
}

pub fn open(path: &Path) -> Result<Repository> {
    Repository::open(path).map_err(|err| {
        SksError::GitOperationFailed(format!("open {}: {}", path.display(), err.message()))
    })
}

/// Branch to follow: the configured one, else the checked-out branch.
pub fn tracking_branch(repo: &Repository, configured: Option<&str>) -> Result<String> {
    if let Some(branch) = configured {
        return Ok(branch.to_string());
    }
    let head = repo.head()?;
    if !head.is_branch() {
        return Err(SksError::GitOperationFailed(
            "clone HEAD is detached and no branch is configured".to_string(),
        ));
    }
    head.shorthand()
        .map(str::to_string)
        .ok_or_else(|| SksError::GitOperationFailed("branch name is not utf-8".to_string()))
}

pub fn head_oid(repo: &Repository) -> Result<Oid> {
    Ok(repo.head()?.peel_to_commit()?.id())
}

/// Whether the working tree has modified, staged or untracked files.
pub fn is_dirty(repo: &Repository) -> Result<bool> {
    let mut options = StatusOptions::new();
    options.include_untracked(true).include_ignored(false);
    Ok(!repo.statuses(Some(&mut options))?.is_empty())
}

/// Throw away every working-tree modification, untracked files included.
pub fn discard_local_changes(repo: &Repository) -> Result<()> {
    let head = repo.head()?.peel_to_commit()?;
    repo.reset(head.as_object(), ResetType::Hard, None)?;
    let mut checkout = CheckoutBuilder::new();
    checkout.force().remove_untracked(true);
    repo.checkout_head(Some(&mut checkout))?;
    debug!(path = ?repo.workdir(), "discarded clone-local changes");
    Ok(())
}

/// Fetch `branch` from origin and return the remote head.
pub fn fetch(repo: &Repository, branch: &str) -> Result<Oid> {
    let mut remote = repo.find_remote(REMOTE)?;
    let refspec = format!("+refs/heads/{branch}:refs/remotes/{REMOTE}/{branch}");
    remote
        .fetch(&[refspec.as_str()], Some(&mut fetch_options()), None)
        .map_err(|err| SksError::GitOperationFailed(format!("fetch {branch}: {}", err.message())))?;
    let remote_branch = repo.find_branch(&format!("{REMOTE}/{branch}"), BranchType::Remote)?;
    remote_branch.get().target().ok_or_else(|| {
        SksError::GitOperationFailed(format!("{REMOTE}/{branch} has no target commit"))
    })
}

/// Move the clone to `target`.
///
/// A fast-forward is always allowed. Diverged history fails unless
/// `force`, which hard-resets to the remote head. Returns whether HEAD moved.
pub fn advance_to(repo: &Repository, target: Oid, force: bool) -> Result<bool> {
    let head = head_oid(repo)?;
    if head == target {
        return Ok(false);
    }
    let fast_forward = repo.graph_descendant_of(target, head)?;
    if !fast_forward && !force {
        return Err(SksError::GitOperationFailed(format!(
            "clone history diverged from remote ({head} vs {target}); use --force to reset"
        )));
    }
    let object = repo.find_object(target, None)?;
    repo.reset(&object, ResetType::Hard, None)?;
    info!(from = %head, to = %target, fast_forward, "advanced tracked clone");
    Ok(true)
}
