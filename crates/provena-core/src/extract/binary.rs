//! Compiled-binary build-info extractor.
//!
//! Compiled binaries carry embedded build-info records: tab-separated
//! `mod`/`dep`/`repo` lines interleaved with arbitrary machine code. The
//! extractor scans for those records (the structured-text contract of the
//! external version-detection tools) and reports a candidate per module.
//!
//! When the records yield several versions for one module, every
//! candidate is reported; ambiguity is data, not an error. Malformed
//! records are an extraction failure, never a crash.

use super::{ArchiveEntry, Extraction, Extractor, parse_archive_entries};
use crate::content::ContentHandle;
use crate::primitives::MAX_CANDIDATES_PER_EXTRACTOR;
use crate::{
    ArtifactFormat, Checksum, ChecksumAlgorithm, ComponentCandidate, ComponentVersion, Ecosystem,
    ExtractionFailure, FailureKind, SourceHint,
};
use std::collections::{BTreeMap, BTreeSet};

/// Detects module identities and versions embedded in compiled binaries.
///
/// Also applies to archives, scanning their binary entries in place and
/// attributing findings to the archive artifact itself.
#[derive(Debug, Default)]
pub struct BinaryBuildInfoExtractor;

/// Record prefixes recognized in binary content.
const MOD_PREFIX: &str = "mod\t";
const DEP_PREFIX: &str = "dep\t";
const REPO_PREFIX: &str = "repo\t";

impl Extractor for BinaryBuildInfoExtractor {
    fn name(&self) -> &'static str {
        "binary-buildinfo"
    }

    fn applies_to(&self, format: ArtifactFormat, content: &ContentHandle) -> bool {
        match format {
            ArtifactFormat::Binary | ArtifactFormat::Archive => true,
            ArtifactFormat::Other => {
                !content.sniff_json_key("layers") && contains_record_marker(content.bytes())
            }
            _ => false,
        }
    }

    fn extract(&self, content: &ContentHandle) -> Result<Extraction, ExtractionFailure> {
        let mut components = if content.sniff_json_key("entries") {
            // Chained over an archive: scan each binary entry in place.
            let entries = parse_archive_entries(self.name(), content)?;
            let mut all = Vec::new();
            for entry in &entries {
                if matches!(entry.format, ArtifactFormat::Binary) {
                    all.extend(self.scan_entry(entry)?);
                }
            }
            all
        } else {
            self.scan_bytes(content.bytes(), Some(checksum_of(content)))?
        };

        if components.len() > MAX_CANDIDATES_PER_EXTRACTOR {
            return Err(ExtractionFailure::new(
                self.name(),
                FailureKind::Tool,
                format!(
                    "{} candidates exceed the per-extractor limit of {MAX_CANDIDATES_PER_EXTRACTOR}",
                    components.len()
                ),
            ));
        }

        components.sort();
        components.dedup();
        Ok(Extraction { components, nested: Vec::new() })
    }
}

impl BinaryBuildInfoExtractor {
    fn scan_entry(&self, entry: &ArchiveEntry) -> Result<Vec<ComponentCandidate>, ExtractionFailure> {
        self.scan_bytes(entry.content.bytes(), Some(checksum_of(&entry.content)))
    }

    /// Scan raw bytes line by line for build-info records.
    ///
    /// `binary_checksum` is attached to `mod` candidates only: the binary
    /// IS that module's build, while `dep` records describe code compiled
    /// into it whose own checksum is not recoverable.
    fn scan_bytes(
        &self,
        bytes: &[u8],
        binary_checksum: Option<Checksum>,
    ) -> Result<Vec<ComponentCandidate>, ExtractionFailure> {
        // name -> set of version candidates; BTreeMap for stable output.
        let mut versions: BTreeMap<String, BTreeSet<ComponentVersion>> = BTreeMap::new();
        let mut main_modules: BTreeSet<String> = BTreeSet::new();
        let mut hints: BTreeMap<String, SourceHint> = BTreeMap::new();

        for raw_line in bytes.split(|&b| b == b'\n') {
            let raw_line = raw_line.strip_suffix(b"\r").unwrap_or(raw_line);
            let line = String::from_utf8_lossy(raw_line);

            if let Some(rest) = line.strip_prefix(MOD_PREFIX) {
                let (name, version) = self.parse_module_record(&line, rest)?;
                versions.entry(name.clone()).or_default().insert(version);
                main_modules.insert(name);
            } else if let Some(rest) = line.strip_prefix(DEP_PREFIX) {
                let (name, version) = self.parse_module_record(&line, rest)?;
                versions.entry(name).or_default().insert(version);
            } else if let Some(rest) = line.strip_prefix(REPO_PREFIX) {
                let fields: Vec<&str> = rest.split('\t').collect();
                if fields.len() != 3 || fields.iter().any(|f| f.is_empty()) {
                    return Err(self.malformed(&line));
                }
                hints.insert(
                    fields[0].to_string(),
                    SourceHint {
                        repository: fields[1].to_string(),
                        revision: fields[2].to_string(),
                    },
                );
            }
        }

        let mut components = Vec::new();
        for (name, version_set) in versions {
            let mut candidate = ComponentCandidate {
                ecosystem: Ecosystem::new(Ecosystem::GO_MODULE),
                name: name.clone(),
                versions: version_set.into_iter().collect(),
                checksum: None,
                source_hint: hints.get(&name).cloned(),
            };
            if main_modules.contains(&name) {
                candidate.checksum = binary_checksum.clone();
            }
            components.push(candidate);
        }
        Ok(components)
    }

    /// Parse the `name<TAB>version` tail of a `mod`/`dep` record.
    fn parse_module_record(
        &self,
        line: &str,
        rest: &str,
    ) -> Result<(String, ComponentVersion), ExtractionFailure> {
        let fields: Vec<&str> = rest.split('\t').collect();
        if fields.len() != 2 || fields[0].is_empty() {
            return Err(self.malformed(line));
        }
        let version = match fields[1] {
            "" | "(devel)" | "unknown" => ComponentVersion::Unknown,
            v => ComponentVersion::resolved(v),
        };
        Ok((fields[0].to_string(), version))
    }

    fn malformed(&self, line: &str) -> ExtractionFailure {
        ExtractionFailure::new(
            self.name(),
            FailureKind::Parse,
            format!("malformed build-info record: {line:?}"),
        )
    }
}

/// Whether any line of the content starts with a record prefix.
fn contains_record_marker(bytes: &[u8]) -> bool {
    bytes.split(|&b| b == b'\n').any(|line| {
        line.starts_with(MOD_PREFIX.as_bytes())
            || line.starts_with(DEP_PREFIX.as_bytes())
            || line.starts_with(REPO_PREFIX.as_bytes())
    })
}

fn checksum_of(content: &ContentHandle) -> Checksum {
    Checksum::new(ChecksumAlgorithm::Sha256, content.sha256_hex())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn binary_with(records: &str) -> ContentHandle {
        // Records embedded between stretches of non-UTF8 machine code.
        let mut bytes = vec![0x7f, b'E', b'L', b'F', 0xff, 0xfe, b'\n'];
        bytes.extend_from_slice(records.as_bytes());
        bytes.extend_from_slice(b"\n\xde\xad\xbe\xef");
        ContentHandle::from_bytes(bytes)
    }

    #[test]
    fn extracts_module_and_dependencies() {
        let content = binary_with(
            "mod\texample.com/foo\t1.2.0\n\
             dep\tgolang.org/x/text\t0.3.0\n\
             repo\texample.com/foo\thttps://example.com/foo\tdeadbeef",
        );

        let extraction = BinaryBuildInfoExtractor.extract(&content).expect("extract");
        assert_eq!(extraction.components.len(), 2);

        let foo = extraction
            .components
            .iter()
            .find(|c| c.name == "example.com/foo")
            .expect("foo candidate");
        assert_eq!(foo.versions, vec![ComponentVersion::resolved("1.2.0")]);
        assert_eq!(
            foo.source_hint.as_ref().map(|h| h.revision.as_str()),
            Some("deadbeef")
        );
        // The binary's own checksum identifies the main module's build.
        assert!(foo.checksum.is_some());

        let dep = extraction
            .components
            .iter()
            .find(|c| c.name == "golang.org/x/text")
            .expect("dep candidate");
        assert!(dep.checksum.is_none());
        assert!(dep.source_hint.is_none());
    }

    #[test]
    fn ambiguous_versions_are_all_reported() {
        let content = binary_with(
            "dep\texample.com/bar\t2.0.0\n\
             dep\texample.com/bar\t2.1.0",
        );

        let extraction = BinaryBuildInfoExtractor.extract(&content).expect("extract");
        assert_eq!(extraction.components.len(), 1);
        assert_eq!(
            extraction.components[0].versions,
            vec![
                ComponentVersion::resolved("2.0.0"),
                ComponentVersion::resolved("2.1.0"),
            ]
        );
    }

    #[test]
    fn devel_version_degrades_to_unknown() {
        let content = binary_with("mod\texample.com/devel\t(devel)");
        let extraction = BinaryBuildInfoExtractor.extract(&content).expect("extract");
        assert_eq!(extraction.components[0].versions, vec![ComponentVersion::Unknown]);
    }

    #[test]
    fn malformed_record_is_a_parse_failure() {
        let content = binary_with("mod\tonly-one-field");
        let failure = BinaryBuildInfoExtractor.extract(&content).expect_err("must fail");
        assert_eq!(failure.kind, FailureKind::Parse);
    }

    #[test]
    fn binary_without_records_succeeds_empty() {
        let content = ContentHandle::from_bytes(vec![0u8; 256]);
        let extraction = BinaryBuildInfoExtractor.extract(&content).expect("extract");
        assert!(extraction.components.is_empty());
    }

    #[test]
    fn scans_binary_entries_of_an_archive() {
        use base64::Engine as _;
        use base64::engine::general_purpose::STANDARD as BASE64;

        let envelope = serde_json::json!({
            "entries": [
                {
                    "name": "bin/foo",
                    "format": "binary",
                    "content": BASE64.encode("mod\texample.com/foo\t1.2.0\n"),
                },
                {"name": "data", "content": BASE64.encode("mod\tskipped\t1.0.0\n")},
            ]
        });
        let content = ContentHandle::from_bytes(envelope.to_string().into_bytes());

        assert!(BinaryBuildInfoExtractor.applies_to(ArtifactFormat::Archive, &content));
        let extraction = BinaryBuildInfoExtractor.extract(&content).expect("extract");

        // Only entries declared binary are scanned.
        assert_eq!(extraction.components.len(), 1);
        assert_eq!(extraction.components[0].name, "example.com/foo");
    }

    #[test]
    fn over_limit_candidate_count_rejects_the_run() {
        let mut records = String::new();
        for i in 0..=MAX_CANDIDATES_PER_EXTRACTOR {
            records.push_str(&format!("mod\texample.com/pkg{i}\t1.0.0\n"));
        }
        let content = ContentHandle::from_bytes(records.into_bytes());

        let failure = BinaryBuildInfoExtractor.extract(&content).expect_err("must fail");
        assert_eq!(failure.kind, FailureKind::Tool);
        assert!(failure.message.contains("per-extractor limit"));
    }
}
