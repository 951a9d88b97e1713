use crate::error::CopyError;
use remote::Direction;
use remote::resolve::TargetQuery;

/// Endpoint token that stands for the task selected by `--id`/`--family`/`--service`
pub const TASK_PLACEHOLDER: &str = "_";

/// One side of a copy as written on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Local(String),
    /// `TOKEN:path`, where `TOKEN` is a task id or [`TASK_PLACEHOLDER`]
    Remote { token: String, path: String },
}

impl Endpoint {
    /// Split at the first ':'; an empty token means the rest is a local path
    pub fn parse(arg: &str) -> Self {
        match arg.split_once(':') {
            Some((token, path)) if !token.is_empty() => Endpoint::Remote {
                token: token.to_string(),
                path: path.to_string(),
            },
            Some((_, path)) => Endpoint::Local(path.to_string()),
            None => Endpoint::Local(arg.to_string()),
        }
    }
}

/// Validated copy request, before the target task is known
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyRequest {
    pub direction: Direction,
    pub local_path: String,
    pub remote_path: String,
    /// Task id taken from the remote endpoint token, `None` for [`TASK_PLACEHOLDER`]
    pub task_id: Option<String>,
}

impl CopyRequest {
    /// Exactly one endpoint must be remote. No side effects.
    pub fn new(src: Endpoint, dst: Endpoint) -> Result<Self, CopyError> {
        let (direction, local_path, remote_path, token) = match (src, dst) {
            (Endpoint::Local(_), Endpoint::Local(_)) => {
                return Err(CopyError::config(
                    "either source or destination must be remote",
                ));
            }
            (Endpoint::Remote { .. }, Endpoint::Remote { .. }) => {
                return Err(CopyError::config(
                    "source and destination cannot both be remote",
                ));
            }
            (Endpoint::Local(local), Endpoint::Remote { token, path }) => {
                let remote = resolve_destination_path(&local, &path)?;
                (Direction::Upload, local, remote, token)
            }
            (Endpoint::Remote { token, path }, Endpoint::Local(local)) => {
                let local = resolve_destination_path(&path, &local)?;
                (Direction::Download, local, path, token)
            }
        };
        if remote_path.is_empty() {
            return Err(CopyError::config("remote path is empty"));
        }
        let task_id = (token != TASK_PLACEHOLDER).then_some(token);
        Ok(Self {
            direction,
            local_path,
            remote_path,
            task_id,
        })
    }

    /// A task id given in the endpoint takes precedence over `--id`
    pub fn narrow(&self, mut query: TargetQuery) -> TargetQuery {
        if let Some(task_id) = &self.task_id {
            query.task_id = Some(task_id.clone());
        }
        query
    }
}

/// Resolves the destination path, "foo/bar -> baz/" becomes "foo/bar -> baz/bar"
///
/// The source basename is appended verbatim to a destination ending with '/'.
pub fn resolve_destination_path(src_path: &str, dst_path: &str) -> Result<String, CopyError> {
    if !dst_path.ends_with('/') {
        return Ok(dst_path.to_string());
    }
    let src_file_name = std::path::Path::new(src_path)
        .file_name()
        .ok_or_else(|| CopyError::config(format!("source path {src_path:?} has no basename")))?;
    Ok(format!("{dst_path}{}", src_file_name.to_string_lossy()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_local_and_remote() {
        assert_eq!(
            Endpoint::parse("README.md"),
            Endpoint::Local("README.md".to_string())
        );
        assert_eq!(
            Endpoint::parse("_:/tmp/"),
            Endpoint::Remote {
                token: "_".to_string(),
                path: "/tmp/".to_string()
            }
        );
        // only the first ':' separates the token
        assert_eq!(
            Endpoint::parse("0123abcd:/tmp/a:b"),
            Endpoint::Remote {
                token: "0123abcd".to_string(),
                path: "/tmp/a:b".to_string()
            }
        );
        assert_eq!(
            Endpoint::parse(":notes.txt"),
            Endpoint::Local("notes.txt".to_string())
        );
    }

    #[test]
    fn upload_into_directory() {
        let request =
            CopyRequest::new(Endpoint::parse("README.md"), Endpoint::parse("_:/tmp/")).unwrap();
        assert_eq!(request.direction, Direction::Upload);
        assert_eq!(request.local_path, "README.md");
        assert_eq!(request.remote_path, "/tmp/README.md");
        assert_eq!(request.task_id, None);
    }

    #[test]
    fn download_into_directory() {
        let request = CopyRequest::new(
            Endpoint::parse("0123abcd:/var/log/app.log"),
            Endpoint::parse("logs/"),
        )
        .unwrap();
        assert_eq!(request.direction, Direction::Download);
        assert_eq!(request.local_path, "logs/app.log");
        assert_eq!(request.remote_path, "/var/log/app.log");
        assert_eq!(request.task_id.as_deref(), Some("0123abcd"));
    }

    #[test]
    fn download_to_stdout() {
        let request = CopyRequest::new(Endpoint::parse("_:/etc/hosts"), Endpoint::parse("-"))
            .unwrap();
        assert_eq!(request.local_path, "-");
    }

    #[test]
    fn exactly_one_side_must_be_remote() {
        let both_local = CopyRequest::new(Endpoint::parse("a"), Endpoint::parse("b"));
        assert!(matches!(both_local, Err(CopyError::Config(_))));
        let both_remote = CopyRequest::new(Endpoint::parse("_:/a"), Endpoint::parse("_:/b"));
        assert!(matches!(both_remote, Err(CopyError::Config(_))));
    }

    #[test]
    fn empty_remote_path_is_rejected() {
        let request = CopyRequest::new(Endpoint::parse("a"), Endpoint::parse("_:"));
        assert!(matches!(request, Err(CopyError::Config(_))));
    }

    #[test]
    fn trailing_separator_appends_basename() {
        for (src, dst, expected) in [
            ("/path/to/file.txt", "/dest/", "/dest/file.txt"),
            ("file.txt", "./", "./file.txt"),
            ("/path/to/file.txt", "/dest/new.txt", "/dest/new.txt"),
            ("/path/to/dir/", "/dest/", "/dest/dir"),
        ] {
            assert_eq!(resolve_destination_path(src, dst).unwrap(), expected);
        }
    }

    #[test]
    fn source_without_basename() {
        assert!(matches!(
            resolve_destination_path("/", "/dest/"),
            Err(CopyError::Config(_))
        ));
        assert!(matches!(
            resolve_destination_path("..", "/dest/"),
            Err(CopyError::Config(_))
        ));
    }

    #[test]
    fn endpoint_task_id_overrides_flag() {
        let request =
            CopyRequest::new(Endpoint::parse("a"), Endpoint::parse("beef:/tmp/a")).unwrap();
        let query = request.narrow(TargetQuery {
            task_id: Some("cafe".to_string()),
            family: Some("web".to_string()),
            ..Default::default()
        });
        assert_eq!(query.task_id.as_deref(), Some("beef"));
        assert_eq!(query.family.as_deref(), Some("web"));
        let placeholder =
            CopyRequest::new(Endpoint::parse("a"), Endpoint::parse("_:/tmp/a")).unwrap();
        let query = placeholder.narrow(TargetQuery {
            task_id: Some("cafe".to_string()),
            ..Default::default()
        });
        assert_eq!(query.task_id.as_deref(), Some("cafe"));
    }
}
