use std::fmt;

use itertools::Itertools;

use crate::error::{ResolveError, ResolveResult};
use crate::model::{Href, HrefSet, Inference};

pub const NO_PROOF_FLAG: &str = "--nope";
pub const QUERY_MARKER: &str = "--query";
pub const PROOF_MARKER: &str = "--proof";

/// Reasoner arguments for a resolved inference, in invocation order:
/// base flag, declared flags, data, query, then proofs.
pub fn build_args(inference: &Inference) -> ResolveResult<Vec<String>> {
    let mut args = vec![NO_PROOF_FLAG.to_string()];

    args.extend(inference.flags.iter().flatten().cloned());
    args.extend(inference.data.href.iter().map(ToString::to_string));

    args.push(QUERY_MARKER.to_string());
    args.push(single_query(inference.query.href.as_ref())?.to_string());

    if let Some(proof) = &inference.proof {
        let hrefs = proof.href.as_ref().ok_or(ResolveError::ProofHrefMissing)?;
        for href in hrefs.iter() {
            args.push(PROOF_MARKER.to_string());
            args.push(href.to_string());
        }
    }

    Ok(args)
}

/// The argument list joined with single spaces.
pub fn build_command(inference: &Inference) -> ResolveResult<String> {
    Ok(build_args(inference)?.iter().join(" "))
}

fn single_query(href: Option<&HrefSet>) -> ResolveResult<&Href> {
    match href {
        Some(HrefSet::One(href)) => Ok(href),
        Some(HrefSet::Many(list)) if list.len() == 1 => Ok(&list[0]),
        Some(HrefSet::Many(list)) if list.len() > 1 => {
            Err(ResolveError::MultipleQueriesNotSupported(list.len()))
        }
        _ => Err(ResolveError::bad_descriptor("inference query href not specified")),
    }
}

/// A reasoner invocation: program plus arguments, spawned without a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReasonerCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ReasonerCommand {
    pub fn for_inference(program: impl Into<String>, inference: &Inference) -> ResolveResult<Self> {
        Ok(Self {
            program: program.into(),
            args: build_args(inference)?,
        })
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .join(" ")
    }
}

impl fmt::Display for ReasonerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DataTarget, ProofTarget, QueryTarget};

    fn inference(data: HrefSet, query: HrefSet) -> Inference {
        Inference {
            query: QueryTarget {
                href: Some(query),
                raw: None,
            },
            data: DataTarget { href: data },
            proof: None,
            options: None,
            flags: None,
        }
    }

    #[test]
    fn single_data_file() {
        let command = build_command(&inference("data.n3".into(), "query.n3".into())).unwrap();
        assert!(command.contains("--nope data.n3 --query query.n3"));
    }

    #[test]
    fn data_list_keeps_order() {
        let command = build_command(&inference(
            vec!["data_01.n3", "data_02.n3"].into(),
            "query.n3".into(),
        ))
        .unwrap();
        assert!(command.contains("--nope data_01.n3 data_02.n3 --query query.n3"));
    }

    #[test]
    fn single_element_query_list_is_unwrapped() {
        let command =
            build_command(&inference("data.n3".into(), vec!["query.n3"].into())).unwrap();
        assert_eq!(command, "--nope data.n3 --query query.n3");
    }

    #[test]
    fn multiple_queries_are_rejected() {
        let err = build_command(&inference(
            "data.n3".into(),
            vec!["query_01.n3", "query_02.n3"].into(),
        ))
        .unwrap_err();
        assert!(err.to_string().contains("cannot handle multiple queries"));
    }

    #[test]
    fn flags_follow_the_base_flag() {
        let mut inf = inference("data.n3".into(), "query.csvq".into());
        inf.flags = Some(vec!["--strings".to_string()]);
        let command = build_command(&inf).unwrap();
        assert!(command.contains("--nope --strings data.n3 --query query.csvq"));
    }

    #[test]
    fn proofs_follow_the_query() {
        let mut inf = inference("data.n3".into(), "query.n3".into());
        inf.proof = Some(ProofTarget {
            href: Some(vec!["http://a", "http://b"].into()),
        });
        let command = build_command(&inf).unwrap();
        assert!(command.contains("--proof http://a"));
        assert!(command.contains("--proof http://b"));
        assert!(command.ends_with("--query query.n3 --proof http://a --proof http://b"));
    }

    #[test]
    fn proof_without_href_is_rejected() {
        let mut inf = inference("data.n3".into(), "query.n3".into());
        inf.proof = Some(ProofTarget::default());
        let err = build_command(&inf).unwrap_err();
        assert!(err.to_string().contains("href for proof not specified"));
    }

    #[test]
    fn reasoner_command_prefixes_the_program() {
        let command =
            ReasonerCommand::for_inference("eye", &inference("d.n3".into(), "q.n3".into()))
                .unwrap();
        assert_eq!(command.args[0], "--nope");
        assert_eq!(command.to_string(), "eye --nope d.n3 --query q.n3");
    }
}
