//! Pipeline input trees
//!
//! An input is a recursive sum type: atoms (CAFS branches), cron ticks and
//! git repos at the leaves, union and cross as the combinators. The enum
//! guarantees each node is exactly one variant; validation only has to
//! check the per-variant fields.

use serde::{Deserialize, Serialize};

use crate::domain::cafs::Branch;

/// An input to a pipeline or job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Input {
    Atom(AtomInput),
    Cron(CronInput),
    Git(GitInput),
    Union(Vec<Input>),
    Cross(Vec<Input>),
}

/// A CAFS branch consumed by the pipeline
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AtomInput {
    #[serde(default)]
    pub name: String,
    pub repo: String,
    #[serde(default)]
    pub branch: String,
    #[serde(default)]
    pub glob: String,
    /// Resolved commit, set on job-level inputs only
    #[serde(default)]
    pub commit: Option<String>,
}

/// A cron schedule materialized as commits in a dedicated repo
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CronInput {
    #[serde(default)]
    pub name: String,
    /// Cron expression, parsed at validation time
    pub spec: String,
    #[serde(default)]
    pub repo: String,
    #[serde(default)]
    pub start: Option<chrono::DateTime<chrono::Utc>>,
}

/// A git repository mirrored into CAFS by the webhook ingress
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GitInput {
    #[serde(default)]
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub branch: String,
}

impl Input {
    /// Visit every node of the tree, parents before children
    pub fn visit<'a>(&'a self, f: &mut impl FnMut(&'a Input)) {
        f(self);
        match self {
            Input::Union(children) | Input::Cross(children) => {
                for child in children {
                    child.visit(f);
                }
            }
            _ => {}
        }
    }

    /// Visit every node of the tree mutably, parents before children
    pub fn visit_mut(&mut self, f: &mut impl FnMut(&mut Input)) {
        f(self);
        match self {
            Input::Union(children) | Input::Cross(children) => {
                for child in children {
                    child.visit_mut(f);
                }
            }
            _ => {}
        }
    }

    /// The branches this input reads from, used as output-branch provenance
    pub fn branches(&self) -> Vec<Branch> {
        let mut result = Vec::new();
        self.visit(&mut |input| match input {
            Input::Atom(atom) => result.push(Branch::new(&atom.repo, &atom.branch)),
            Input::Cron(cron) => result.push(Branch::new(&cron.repo, "master")),
            Input::Git(git) => result.push(Branch::new(&git.name, &git.branch)),
            _ => {}
        });
        result
    }

    /// The distinct set of atom repos under this tree
    pub fn atom_repos(&self) -> Vec<String> {
        let mut repos = Vec::new();
        self.visit(&mut |input| {
            if let Input::Atom(atom) = input {
                if !repos.contains(&atom.repo) {
                    repos.push(atom.repo.clone());
                }
            }
        });
        repos
    }

    /// True if any node of the tree is a git input
    pub fn has_git(&self) -> bool {
        let mut found = false;
        self.visit(&mut |input| {
            if matches!(input, Input::Git(_)) {
                found = true;
            }
        });
        found
    }

    /// Sort union and cross children into a canonical order so that
    /// semantically equal inputs serialize to identical bytes (and hash
    /// identically for datum purposes).
    pub fn sort_canonical(&mut self) {
        if let Input::Union(children) | Input::Cross(children) = self {
            for child in children.iter_mut() {
                child.sort_canonical();
            }
            children.sort_by_cached_key(|child| {
                serde_json::to_string(child).unwrap_or_default()
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atom(name: &str, repo: &str) -> Input {
        Input::Atom(AtomInput {
            name: name.to_string(),
            repo: repo.to_string(),
            branch: "master".to_string(),
            glob: "/*".to_string(),
            commit: None,
        })
    }

    #[test]
    fn test_visit_reaches_nested_leaves() {
        let input = Input::Cross(vec![
            Input::Union(vec![atom("a", "ra"), atom("b", "rb")]),
            atom("c", "rc"),
        ]);

        let mut names = Vec::new();
        input.visit(&mut |i| {
            if let Input::Atom(a) = i {
                names.push(a.name.clone());
            }
        });
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_atom_repos_deduplicates() {
        let input = Input::Cross(vec![atom("a", "shared"), atom("b", "shared"), atom("c", "other")]);
        assert_eq!(input.atom_repos(), vec!["shared", "other"]);
    }

    #[test]
    fn test_canonical_sort_is_order_insensitive() {
        let mut left = Input::Cross(vec![atom("b", "rb"), atom("a", "ra")]);
        let mut right = Input::Cross(vec![atom("a", "ra"), atom("b", "rb")]);
        left.sort_canonical();
        right.sort_canonical();
        assert_eq!(
            serde_json::to_string(&left).unwrap(),
            serde_json::to_string(&right).unwrap()
        );
    }

    #[test]
    fn test_branches_includes_cron_master() {
        let input = Input::Union(vec![
            atom("a", "ra"),
            Input::Cron(CronInput {
                name: "tick".to_string(),
                spec: "0 0 * * * *".to_string(),
                repo: "p_tick".to_string(),
                start: None,
            }),
        ]);
        let branches = input.branches();
        assert_eq!(branches.len(), 2);
        assert_eq!(branches[1], Branch::new("p_tick", "master"));
    }
}
