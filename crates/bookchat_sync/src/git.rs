//! Git-backed mirror driven through the `git` command line.

use crate::config::GitMirrorConfig;
use crate::error::{MirrorError, MirrorResult};
use crate::mirror::{MirrorEntry, RemoteMirror, RemoteRef};
use parking_lot::Mutex;
use std::ffi::OsStr;
use std::fmt;
use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tracing::{debug, info};

/// A parsed repository URL.
///
/// Accepts `https://host/owner/repo(.git)` (also `http://` and `ssh://`)
/// and the scp-like `git@host:owner/repo(.git)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteUrl {
    /// Host name.
    pub host: String,
    /// Owner or organisation.
    pub owner: String,
    /// Repository name without `.git`.
    pub repo: String,
}

impl RemoteUrl {
    /// Parses a repository URL.
    ///
    /// # Errors
    ///
    /// Returns [`MirrorError::InvalidRemote`] if the URL is not one of the
    /// accepted forms.
    pub fn parse(url: &str) -> MirrorResult<Self> {
        let url = url.trim();
        let invalid = || MirrorError::InvalidRemote(format!("unrecognised repository url {url:?}"));

        let (host, path) = if let Some(rest) = ["https://", "http://", "ssh://"]
            .iter()
            .find_map(|scheme| url.strip_prefix(scheme))
        {
            let (authority, path) = rest.split_once('/').ok_or_else(invalid)?;
            let host = authority.rsplit('@').next().unwrap_or(authority);
            (host, path)
        } else if let Some((user_host, path)) = url.split_once(':') {
            let (_, host) = user_host.split_once('@').ok_or_else(invalid)?;
            (host, path)
        } else {
            return Err(invalid());
        };

        let host = host.split(':').next().unwrap_or(host);
        let path = path.trim_end_matches('/');
        let path = path.strip_suffix(".git").unwrap_or(path);
        let mut segments = path.split('/');
        let (Some(owner), Some(repo), None) = (segments.next(), segments.next(), segments.next())
        else {
            return Err(invalid());
        };

        if host.is_empty() || owner.is_empty() || repo.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            host: host.to_string(),
            owner: owner.to_string(),
            repo: repo.to_string(),
        })
    }

    /// Returns true if `remote` looks like a URL rather than a remote name.
    pub fn looks_like_url(remote: &str) -> bool {
        remote.contains("://") || (remote.contains('@') && remote.contains(':'))
    }
}

impl fmt::Display for RemoteUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.host, self.owner, self.repo)
    }
}

/// Where pushes go.
#[derive(Debug, Clone)]
struct PushTarget {
    /// What is passed to `git push`.
    target: String,
    /// Parsed form, when the URL could be parsed.
    url: Option<RemoteUrl>,
}

/// Mirrors messages as JSON files committed to a Git work tree.
///
/// Each commit writes `<messages_dir>/message_<id>.json`, force-adds it,
/// commits it as `Add message <id>`, pushes when a remote is configured,
/// and returns the new `HEAD`. A message whose file is already committed
/// with the same content is not committed again: its existing commit is
/// pushed and returned, so a retry after a failed push or sync mark leaves
/// one commit per message.
pub struct GitMirror {
    config: GitMirrorConfig,
    push: Option<PushTarget>,
    // Serializes use of the work tree and index.
    lock: Mutex<()>,
}

impl GitMirror {
    /// Opens the mirror, initialising the repository if configured to.
    ///
    /// # Errors
    ///
    /// - [`MirrorError::InvalidConfig`] for a bad configuration or a work
    ///   tree that is not a repository while `init_if_missing` is off
    /// - [`MirrorError::InvalidRemote`] for an unknown remote name or an
    ///   unparseable URL
    /// - [`MirrorError::Command`] if git fails, [`MirrorError::Io`] if the
    ///   directories cannot be created
    pub fn open(config: GitMirrorConfig) -> MirrorResult<Self> {
        config.validate()?;

        if !config.work_dir.exists() {
            if !config.init_if_missing {
                return Err(MirrorError::InvalidConfig(format!(
                    "mirror work tree {} does not exist",
                    config.work_dir.display()
                )));
            }
            fs::create_dir_all(&config.work_dir)?;
        }

        let mut mirror = Self {
            config,
            push: None,
            lock: Mutex::new(()),
        };

        if !mirror.is_work_tree() {
            if !mirror.config.init_if_missing {
                return Err(MirrorError::InvalidConfig(format!(
                    "{} is not a git work tree",
                    mirror.config.work_dir.display()
                )));
            }
            mirror.run_git(["init", "--quiet"])?;
            let head = format!("refs/heads/{}", mirror.config.branch);
            mirror.run_git(["symbolic-ref", "HEAD", head.as_str()])?;
            info!(work_dir = %mirror.config.work_dir.display(), "initialised mirror repository");
        }

        fs::create_dir_all(mirror.config.work_dir.join(&mirror.config.messages_dir))?;
        mirror.push = mirror.resolve_remote()?;

        info!(mirror = %mirror.describe(), "git mirror ready");
        Ok(mirror)
    }

    /// Returns the configuration.
    pub fn config(&self) -> &GitMirrorConfig {
        &self.config
    }

    /// Returns the parsed push URL, if one is known.
    pub fn remote_url(&self) -> Option<&RemoteUrl> {
        self.push.as_ref().and_then(|p| p.url.as_ref())
    }

    fn is_work_tree(&self) -> bool {
        is_git_work_tree(&self.config.work_dir)
    }

    fn resolve_remote(&self) -> MirrorResult<Option<PushTarget>> {
        let Some(remote) = self.config.remote.as_deref() else {
            return Ok(None);
        };

        // Local bare repositories are pushed to by path.
        if Path::new(remote).is_absolute() || remote.starts_with("file://") {
            return Ok(Some(PushTarget {
                target: remote.to_string(),
                url: None,
            }));
        }

        if RemoteUrl::looks_like_url(remote) {
            let url = RemoteUrl::parse(remote)?;
            return Ok(Some(PushTarget {
                target: remote.to_string(),
                url: Some(url),
            }));
        }

        let fetch_url = self
            .run_git(["remote", "get-url", remote])
            .map_err(|_| MirrorError::InvalidRemote(format!("no git remote named {remote:?}")))?;
        Ok(Some(PushTarget {
            target: remote.to_string(),
            url: RemoteUrl::parse(fetch_url.trim()).ok(),
        }))
    }

    fn git_output<I, S>(&self, args: I) -> MirrorResult<(Vec<S>, Output)>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let args: Vec<S> = args.into_iter().collect();
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.config.work_dir)
            .args(&args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()?;
        Ok((args, output))
    }

    fn run_git<I, S>(&self, args: I) -> MirrorResult<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let (args, output) = self.git_output(args)?;
        if !output.status.success() {
            return Err(command_error(&args, &output));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Returns true if `path` is staged with content that differs from `HEAD`.
    fn has_staged_changes(&self, path: &Path) -> MirrorResult<bool> {
        let (_, head) = self.git_output(["rev-parse", "--verify", "--quiet", "HEAD"])?;
        if !head.status.success() {
            // Unborn branch: whatever was added is new.
            return Ok(true);
        }

        let mut diff: Vec<&OsStr> = ["diff", "--cached", "--quiet", "--"]
            .into_iter()
            .map(OsStr::new)
            .collect();
        diff.push(path.as_os_str());
        let (args, output) = self.git_output(diff)?;
        match output.status.code() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(command_error(&args, &output)),
        }
    }

    fn push(&self, target: &PushTarget) -> MirrorResult<()> {
        let refspec = format!("HEAD:refs/heads/{}", self.config.branch);
        self.run_git(["push", "--quiet", target.target.as_str(), refspec.as_str()])
            .map(|_| ())
            .map_err(|e| match e {
                MirrorError::Command { stderr, .. } => MirrorError::Push {
                    remote: target.target.clone(),
                    stderr,
                },
                other => other,
            })
    }
}

impl RemoteMirror for GitMirror {
    fn commit(&self, entry: &MirrorEntry) -> MirrorResult<RemoteRef> {
        let _guard = self.lock.lock();

        let relative = self.config.messages_dir.join(entry.file_name());
        fs::write(self.config.work_dir.join(&relative), entry.to_json()?)?;

        let mut add: Vec<&OsStr> = vec![OsStr::new("add"), OsStr::new("-f"), OsStr::new("--")];
        add.push(relative.as_os_str());
        self.run_git(add)?;

        let staged = self.has_staged_changes(&relative)?;
        if staged {
            let name = format!("user.name={}", self.config.author_name);
            let email = format!("user.email={}", self.config.author_email);
            let message = entry.commit_message();
            self.run_git([
                "-c",
                name.as_str(),
                "-c",
                email.as_str(),
                "-c",
                "commit.gpgsign=false",
                "commit",
                "--quiet",
                "-m",
                message.as_str(),
            ])?;
        } else {
            // Committed by an earlier attempt whose push or sync mark failed.
            debug!(message_id = %entry.id, "message already committed, not committing again");
        }

        if let Some(target) = &self.push {
            self.push(target)?;
        }

        let head = if staged {
            self.run_git(["rev-parse", "HEAD"])?
        } else {
            let mut log: Vec<&OsStr> = ["log", "-1", "--format=%H", "--"]
                .into_iter()
                .map(OsStr::new)
                .collect();
            log.push(relative.as_os_str());
            self.run_git(log)?
        };
        let head = head.trim();
        if head.is_empty() {
            return Err(MirrorError::Command {
                command: "git rev-parse HEAD".into(),
                status: "empty output".into(),
                stderr: String::new(),
            });
        }

        debug!(message_id = %entry.id, remote_ref = head, "message committed to git mirror");
        Ok(RemoteRef::new(head))
    }

    fn describe(&self) -> String {
        let work_dir = self.config.work_dir.display();
        match &self.push {
            Some(PushTarget { url: Some(url), .. }) => {
                format!("git {work_dir} -> {url} ({})", self.config.branch)
            }
            Some(PushTarget { target, .. }) => {
                format!("git {work_dir} -> {target} ({})", self.config.branch)
            }
            None => format!("git {work_dir} ({}, local only)", self.config.branch),
        }
    }
}

impl fmt::Debug for GitMirror {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitMirror")
            .field("work_dir", &self.config.work_dir)
            .field("branch", &self.config.branch)
            .field("push", &self.push.as_ref().map(|p| p.target.as_str()))
            .finish()
    }
}

fn command_error<S: AsRef<OsStr>>(args: &[S], output: &Output) -> MirrorError {
    let command = std::iter::once("git".to_string())
        .chain(args.iter().map(|a| a.as_ref().to_string_lossy().into_owned()))
        .collect::<Vec<_>>()
        .join(" ");
    MirrorError::Command {
        command,
        status: output.status.to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    }
}

/// Returns true if a `git` executable can be run.
pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Returns true if `path` is inside a git work tree.
pub fn is_git_work_tree(path: &Path) -> bool {
    Command::new("git")
        .arg("-C")
        .arg(path)
        .args(["rev-parse", "--is-inside-work-tree"])
        .output()
        .map(|o| o.status.success() && String::from_utf8_lossy(&o.stdout).trim() == "true")
        .unwrap_or(false)
}
