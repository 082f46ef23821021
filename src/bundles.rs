//! Zip bundles uploaded per challenge, laid out as `<root>/<challengeId>/<kind>.zip`.

use crate::error::{Error, Result};
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArtifactKind {
    Challenge,
    Handout,
    Solution,
}

impl ArtifactKind {
    pub fn file_name(self) -> &'static str {
        match self {
            ArtifactKind::Challenge => "challenge.zip",
            ArtifactKind::Handout => "handout.zip",
            ArtifactKind::Solution => "solution.zip",
        }
    }
}

#[derive(Clone, Debug)]
pub struct BundleStore {
    root: PathBuf,
}

impl BundleStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path(&self, challenge_id: &str, kind: ArtifactKind) -> Result<PathBuf> {
        // Challenge ids become a path component
        if challenge_id.is_empty()
            || challenge_id == "."
            || challenge_id == ".."
            || challenge_id.contains(['/', '\\'])
        {
            return Err(Error::BadRequest(format!(
                "invalid challenge id {:?}",
                challenge_id
            )));
        }
        Ok(self.root.join(challenge_id).join(kind.file_name()))
    }

    pub async fn read(&self, challenge_id: &str, kind: ArtifactKind) -> Result<Vec<u8>> {
        let path = self.path(challenge_id, kind)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::NotFound(format!(
                "{} for challenge {}",
                kind.file_name(),
                challenge_id
            ))),
            Err(e) => Err(e.into()),
        }
    }
}
