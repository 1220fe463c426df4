//! Input validation and defaulting
//!
//! Shape-checks pipeline and job specs and fills defaults. Name
//! uniqueness is union-scoped: children of a union may collide with
//! each other, but everything crossed with the union sees their names.

use std::collections::HashSet;
use std::str::FromStr;

use sluice_core::domain::input::Input;
use sluice_core::domain::pipeline::{
    PipelineSpec, ResourceSpec, Transform, DEFAULT_CACHE_SIZE, DEFAULT_USER_IMAGE,
};
use sluice_core::quantity::parse_quantity;

use crate::clients::cafs::CafsClient;
use crate::error::{Error, Result};

fn check_name(names: &mut HashSet<String>, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Validation("input must specify a name".to_string()));
    }
    if name == "out" {
        return Err(Error::Validation(
            "input cannot be named \"out\", as \"out\" is reserved for the job's output"
                .to_string(),
        ));
    }
    if !names.insert(name.to_string()) {
        return Err(Error::Validation(format!(
            "name {} was used more than once",
            name
        )));
    }
    Ok(())
}

/// Union children validate against a copy of the ambient name set and
/// the copies merge back afterwards; cross children share the ambient
/// set directly so peers see each other's names.
fn validate_names(names: &mut HashSet<String>, input: &Input) -> Result<()> {
    match input {
        Input::Atom(atom) => check_name(names, &atom.name),
        Input::Cron(cron) => check_name(names, &cron.name),
        Input::Git(git) => check_name(names, &git.name),
        Input::Union(children) => {
            let mut scopes = Vec::with_capacity(children.len());
            for child in children {
                let mut scope = names.clone();
                validate_names(&mut scope, child)?;
                scopes.push(scope);
            }
            for scope in scopes {
                names.extend(scope);
            }
            Ok(())
        }
        Input::Cross(children) => {
            for child in children {
                validate_names(names, child)?;
            }
            Ok(())
        }
    }
}

fn validate_git_url(url: &str) -> Result<()> {
    let well_formed = (url.starts_with("https://")
        || url.starts_with("http://")
        || url.starts_with("git@"))
        && url.ends_with(".git");
    if !well_formed {
        return Err(Error::Validation(format!("invalid git clone URL: {}", url)));
    }
    Ok(())
}

/// Validate an input tree. With `as_job` set, atoms may carry a resolved
/// commit instead of a branch, and the commit's existence is checked;
/// on the pipeline path the atom repo must exist.
pub async fn validate_input(cafs: &dyn CafsClient, input: &Input, as_job: bool) -> Result<()> {
    validate_names(&mut HashSet::new(), input)?;

    let mut nodes = Vec::new();
    input.visit(&mut |node| nodes.push(node));

    for node in nodes {
        match node {
            Input::Atom(atom) => {
                if atom.repo.is_empty() {
                    return Err(Error::Validation("input must specify a repo".to_string()));
                }
                if atom.branch.is_empty() && !as_job {
                    return Err(Error::Validation("input must specify a branch".to_string()));
                }
                if atom.glob.is_empty() {
                    return Err(Error::Validation("input must specify a glob".to_string()));
                }
                // A job atom has an empty commit when its input branch had
                // no commits yet
                match (&atom.commit, as_job) {
                    (Some(commit), true) => {
                        cafs.inspect_commit(&atom.repo, commit).await?;
                    }
                    _ => {
                        cafs.inspect_repo(&atom.repo).await?;
                    }
                }
            }
            Input::Cron(cron) => {
                cron::Schedule::from_str(&cron.spec).map_err(|e| {
                    Error::Validation(format!("invalid cron expression '{}': {}", cron.spec, e))
                })?;
            }
            Input::Git(git) => validate_git_url(&git.url)?,
            Input::Union(_) | Input::Cross(_) => {}
        }
    }
    Ok(())
}

pub fn validate_transform(transform: &Transform) -> Result<()> {
    if transform.cmd.is_empty() {
        return Err(Error::Validation("no cmd set".to_string()));
    }
    Ok(())
}

/// Full pipeline-spec validation, including the CAFS-backed checks
pub async fn validate_pipeline(cafs: &dyn CafsClient, spec: &PipelineSpec) -> Result<()> {
    validate_input(cafs, &spec.input, false).await?;
    validate_transform(&spec.transform)
        .map_err(|e| Error::Validation(format!("invalid transform: {}", e)))?;

    if let Some(parallelism) = &spec.parallelism_spec {
        if parallelism.coefficient < 0.0 {
            return Err(Error::Validation(
                "parallelism coefficient must not be negative".to_string(),
            ));
        }
        if parallelism.constant != 0 && parallelism.coefficient != 0.0 {
            return Err(Error::Validation(
                "contradictory parallelism strategies: must set at most one of constant \
                 and coefficient"
                    .to_string(),
            ));
        }
        if spec.service.is_some() && parallelism.constant != 1 {
            return Err(Error::Validation(
                "services can only be run with a constant parallelism of 1".to_string(),
            ));
        }
    }

    if spec.output_branch.is_empty() {
        return Err(Error::Validation(
            "pipeline needs to specify an output branch".to_string(),
        ));
    }

    parse_quantity(&spec.cache_size).map_err(|e| {
        Error::Validation(format!("could not parse cache_size '{}': {}", spec.cache_size, e))
    })?;

    for (field, value) in [
        ("job_timeout", &spec.job_timeout),
        ("datum_timeout", &spec.datum_timeout),
    ] {
        if let Some(value) = value {
            humantime::parse_duration(value).map_err(|e| {
                Error::Validation(format!("could not parse {} '{}': {}", field, value, e))
            })?;
        }
    }

    if spec.incremental {
        // Incremental pipelines cannot have inputs that share provenance
        let mut seen = HashSet::new();
        for branch in spec.input.branches() {
            if !seen.insert(format!("{}/{}", branch.repo, branch.name)) {
                return Err(Error::Validation(
                    "can't create an incremental pipeline with inputs that share provenance"
                        .to_string(),
                ));
            }
            match cafs.inspect_branch(&branch.repo, &branch.name).await {
                Ok(info) => {
                    for prov in info.provenance {
                        if !seen.insert(format!("{}/{}", prov.repo, prov.name)) {
                            return Err(Error::Validation(
                                "can't create an incremental pipeline with inputs that share \
                                 provenance"
                                    .to_string(),
                            ));
                        }
                    }
                }
                // Input branch doesn't exist yet; it will be created with
                // empty provenance
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e),
            }
        }
    }
    Ok(())
}

pub async fn validate_job(cafs: &dyn CafsClient, transform: &Transform, input: &Input) -> Result<()> {
    validate_transform(transform)?;
    validate_input(cafs, input, true).await
}

/// Fill defaults in place. Idempotent; ends with a canonical input sort
/// so equal specs serialize identically.
pub fn set_pipeline_defaults(spec: &mut PipelineSpec) {
    let pipeline_name = spec.name.clone();
    let now = chrono::Utc::now();

    if spec.transform.image.is_empty() {
        spec.transform.image = DEFAULT_USER_IMAGE.to_string();
    }
    spec.input.visit_mut(&mut |input| match input {
        Input::Atom(atom) => {
            if atom.branch.is_empty() {
                atom.branch = "master".to_string();
            }
            if atom.name.is_empty() {
                atom.name = atom.repo.clone();
            }
        }
        Input::Cron(cron) => {
            if cron.start.is_none() {
                cron.start = Some(now);
            }
            if cron.repo.is_empty() {
                cron.repo = format!("{}_{}", pipeline_name, cron.name);
            }
        }
        Input::Git(git) => {
            if git.branch.is_empty() {
                git.branch = "master".to_string();
            }
            if git.name.is_empty() {
                // URL looks like "https://github.com/acme/project.git"
                let base = git.url.rsplit('/').next().unwrap_or(&git.url);
                git.name = base.split('.').next().unwrap_or(base).to_string();
            }
        }
        _ => {}
    });
    if spec.output_branch.is_empty() {
        spec.output_branch = "master".to_string();
    }
    if spec.cache_size.is_empty() {
        spec.cache_size = DEFAULT_CACHE_SIZE.to_string();
    }
    if spec.resource_requests.is_none() {
        spec.resource_requests = Some(ResourceSpec {
            memory: Some(spec.cache_size.clone()),
            ..Default::default()
        });
    }
    if spec.max_queue_size < 1 {
        spec.max_queue_size = 1;
    }
    spec.input.sort_canonical();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::memory::MemoryCafs;
    use sluice_core::domain::cafs::Branch;
    use sluice_core::domain::input::{AtomInput, CronInput, GitInput};
    use sluice_core::domain::pipeline::{ParallelismSpec, ServiceSpec};

    fn atom(name: &str, repo: &str) -> Input {
        Input::Atom(AtomInput {
            name: name.to_string(),
            repo: repo.to_string(),
            branch: "master".to_string(),
            glob: "/*".to_string(),
            commit: None,
        })
    }

    fn spec_with_input(input: Input) -> PipelineSpec {
        PipelineSpec {
            name: "p".to_string(),
            version: 1,
            description: None,
            transform: Transform {
                cmd: vec!["sh".to_string()],
                ..Default::default()
            },
            parallelism_spec: None,
            input,
            output_branch: "master".to_string(),
            resource_requests: None,
            resource_limits: None,
            cache_size: "64M".to_string(),
            incremental: false,
            enable_stats: false,
            salt: "salt".to_string(),
            max_queue_size: 1,
            service: None,
            chunk_spec: None,
            datum_timeout: None,
            job_timeout: None,
            created_at: chrono::Utc::now(),
            githook_url: None,
        }
    }

    async fn cafs_with_repos(repos: &[&str]) -> MemoryCafs {
        let cafs = MemoryCafs::new();
        for repo in repos {
            cafs.create_repo(repo).await.unwrap();
        }
        cafs
    }

    #[test]
    fn test_union_children_may_share_names() {
        let input = Input::Union(vec![atom("x", "a"), atom("x", "b")]);
        assert!(validate_names(&mut HashSet::new(), &input).is_ok());
    }

    #[test]
    fn test_union_names_escape_into_cross() {
        // The union's "x" escapes into the cross, clashing with the third
        // input
        let input = Input::Cross(vec![
            Input::Union(vec![atom("x", "a"), atom("x", "b")]),
            atom("x", "c"),
        ]);
        let err = validate_names(&mut HashSet::new(), &input).unwrap_err();
        assert!(err.to_string().contains("used more than once"));
    }

    #[test]
    fn test_cross_children_must_be_distinct() {
        let input = Input::Cross(vec![atom("x", "a"), atom("x", "b")]);
        assert!(validate_names(&mut HashSet::new(), &input).is_err());
    }

    #[tokio::test]
    async fn test_out_is_reserved() {
        let cafs = cafs_with_repos(&["a"]).await;
        let input = atom("out", "a");
        let err = validate_input(&cafs, &input, false).await.unwrap_err();
        assert!(err.to_string().contains("reserved"));
    }

    #[tokio::test]
    async fn test_atom_repo_must_exist() {
        let cafs = MemoryCafs::new();
        let err = validate_input(&cafs, &atom("a", "missing"), false)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_bad_cron_expression() {
        let cafs = MemoryCafs::new();
        let input = Input::Cron(CronInput {
            name: "tick".to_string(),
            spec: "whenever".to_string(),
            repo: "p_tick".to_string(),
            start: None,
        });
        let err = validate_input(&cafs, &input, false).await.unwrap_err();
        assert!(err.to_string().contains("invalid cron expression"));
    }

    #[tokio::test]
    async fn test_bad_git_url() {
        let cafs = MemoryCafs::new();
        let input = Input::Git(GitInput {
            name: "repo".to_string(),
            url: "ftp://example.com/repo".to_string(),
            branch: "master".to_string(),
        });
        let err = validate_input(&cafs, &input, false).await.unwrap_err();
        assert!(err.to_string().contains("invalid git clone URL"));
    }

    #[tokio::test]
    async fn test_contradictory_parallelism() {
        let cafs = cafs_with_repos(&["a"]).await;
        let mut spec = spec_with_input(atom("a", "a"));
        spec.parallelism_spec = Some(ParallelismSpec {
            constant: 2,
            coefficient: 1.0,
        });
        let err = validate_pipeline(&cafs, &spec).await.unwrap_err();
        assert!(err.to_string().contains("contradictory"));
    }

    #[tokio::test]
    async fn test_service_requires_constant_one() {
        let cafs = cafs_with_repos(&["a"]).await;
        let mut spec = spec_with_input(atom("a", "a"));
        spec.service = Some(ServiceSpec {
            internal_port: 80,
            external_port: 30080,
        });
        spec.parallelism_spec = Some(ParallelismSpec {
            constant: 3,
            coefficient: 0.0,
        });
        assert!(validate_pipeline(&cafs, &spec).await.is_err());
    }

    #[tokio::test]
    async fn test_bad_cache_size() {
        let cafs = cafs_with_repos(&["a"]).await;
        let mut spec = spec_with_input(atom("a", "a"));
        spec.cache_size = "lots".to_string();
        let err = validate_pipeline(&cafs, &spec).await.unwrap_err();
        assert!(err.to_string().contains("could not parse cache_size"));
    }

    #[tokio::test]
    async fn test_bad_timeout() {
        let cafs = cafs_with_repos(&["a"]).await;
        let mut spec = spec_with_input(atom("a", "a"));
        spec.job_timeout = Some("sometime".to_string());
        assert!(validate_pipeline(&cafs, &spec).await.is_err());
    }

    #[tokio::test]
    async fn test_incremental_rejects_shared_provenance() {
        let cafs = cafs_with_repos(&["a", "b", "shared"]).await;
        // Both input branches are provenant on shared/master
        cafs.create_branch("shared", "master", None, &[]).await.unwrap();
        cafs.create_branch("a", "master", None, &[Branch::new("shared", "master")])
            .await
            .unwrap();
        cafs.create_branch("b", "master", None, &[Branch::new("shared", "master")])
            .await
            .unwrap();

        let mut spec = spec_with_input(Input::Cross(vec![atom("a", "a"), atom("b", "b")]));
        spec.incremental = true;
        let err = validate_pipeline(&cafs, &spec).await.unwrap_err();
        assert!(err.to_string().contains("share provenance"));
    }

    #[tokio::test]
    async fn test_job_input_checks_the_commit() {
        let cafs = cafs_with_repos(&["a"]).await;
        let commit = cafs.start_commit("a", "master").await.unwrap();
        cafs.finish_commit("a", &commit.id, false).await.unwrap();
        let transform = Transform {
            cmd: vec!["sh".to_string()],
            ..Default::default()
        };

        let good = Input::Atom(AtomInput {
            name: "a".to_string(),
            repo: "a".to_string(),
            branch: "master".to_string(),
            glob: "/*".to_string(),
            commit: Some(commit.id),
        });
        validate_job(&cafs, &transform, &good).await.unwrap();

        let bad = Input::Atom(AtomInput {
            name: "a".to_string(),
            repo: "a".to_string(),
            branch: "master".to_string(),
            glob: "/*".to_string(),
            commit: Some("missing".to_string()),
        });
        assert!(validate_job(&cafs, &transform, &bad).await.is_err());
    }

    #[test]
    fn test_defaults_fill_and_are_idempotent() {
        let mut spec = spec_with_input(Input::Atom(AtomInput {
            name: String::new(),
            repo: "images".to_string(),
            branch: String::new(),
            glob: "/*".to_string(),
            commit: None,
        }));
        spec.transform.image = String::new();
        spec.output_branch = String::new();
        spec.cache_size = String::new();
        spec.resource_requests = None;
        spec.max_queue_size = 0;

        set_pipeline_defaults(&mut spec);
        let once = serde_json::to_string(&spec.input).unwrap();

        assert_eq!(spec.transform.image, DEFAULT_USER_IMAGE);
        assert_eq!(spec.output_branch, "master");
        assert_eq!(spec.cache_size, DEFAULT_CACHE_SIZE);
        assert_eq!(
            spec.resource_requests.as_ref().unwrap().memory.as_deref(),
            Some(DEFAULT_CACHE_SIZE)
        );
        assert_eq!(spec.max_queue_size, 1);
        match &spec.input {
            Input::Atom(atom) => {
                assert_eq!(atom.name, "images");
                assert_eq!(atom.branch, "master");
            }
            other => panic!("unexpected input: {:?}", other),
        }

        set_pipeline_defaults(&mut spec);
        assert_eq!(serde_json::to_string(&spec.input).unwrap(), once);
    }

    #[test]
    fn test_git_name_defaults_from_url() {
        let mut spec = spec_with_input(Input::Git(GitInput {
            name: String::new(),
            url: "https://github.com/acme/testhook.git".to_string(),
            branch: String::new(),
        }));
        set_pipeline_defaults(&mut spec);
        match &spec.input {
            Input::Git(git) => {
                assert_eq!(git.name, "testhook");
                assert_eq!(git.branch, "master");
            }
            other => panic!("unexpected input: {:?}", other),
        }
    }

    #[test]
    fn test_cron_repo_defaults_to_pipeline_scoped_name() {
        let mut spec = spec_with_input(Input::Cron(CronInput {
            name: "tick".to_string(),
            spec: "0 0 * * * *".to_string(),
            repo: String::new(),
            start: None,
        }));
        set_pipeline_defaults(&mut spec);
        match &spec.input {
            Input::Cron(cron) => {
                assert_eq!(cron.repo, "p_tick");
                assert!(cron.start.is_some());
            }
            other => panic!("unexpected input: {:?}", other),
        }
    }
}
