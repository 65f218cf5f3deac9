use serde::{Deserialize, Serialize};

/// State of a `Source` row (§3, §4.9). The `*-ing` variants are claim
/// markers — see `relato-store`'s claim-pattern queries (§5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceState {
    ReadyForClassification,
    Classifying,
    Discarded,
    ReadyForDownload,
    Downloading,
    FailedInDownload,
    ReadyForExtraction,
    Extracting,
    FailedInExtraction,
    Extracted,
}

impl SourceState {
    /// The claim state this state advances to when a worker pool picks up
    /// the row, or `None` if this state is not a claimable input state.
    pub fn claim_state(self) -> Option<SourceState> {
        match self {
            SourceState::ReadyForClassification => Some(SourceState::Classifying),
            SourceState::ReadyForDownload => Some(SourceState::Downloading),
            SourceState::ReadyForExtraction => Some(SourceState::Extracting),
            _ => None,
        }
    }

    pub fn as_db_str(self) -> &'static str {
        match self {
            SourceState::ReadyForClassification => "ready_for_classification",
            SourceState::Classifying => "classifying",
            SourceState::Discarded => "discarded",
            SourceState::ReadyForDownload => "ready_for_download",
            SourceState::Downloading => "downloading",
            SourceState::FailedInDownload => "failed_in_download",
            SourceState::ReadyForExtraction => "ready_for_extraction",
            SourceState::Extracting => "extracting",
            SourceState::FailedInExtraction => "failed_in_extraction",
            SourceState::Extracted => "extracted",
        }
    }
}

impl std::fmt::Display for SourceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl std::str::FromStr for SourceState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ready_for_classification" => Ok(Self::ReadyForClassification),
            "classifying" => Ok(Self::Classifying),
            "discarded" => Ok(Self::Discarded),
            "ready_for_download" => Ok(Self::ReadyForDownload),
            "downloading" => Ok(Self::Downloading),
            "failed_in_download" => Ok(Self::FailedInDownload),
            "ready_for_extraction" => Ok(Self::ReadyForExtraction),
            "extracting" => Ok(Self::Extracting),
            "failed_in_extraction" => Ok(Self::FailedInExtraction),
            "extracted" => Ok(Self::Extracted),
            other => Err(format!("unknown SourceState: {other}")),
        }
    }
}

/// Dedup state of a `RawEvent` (§3). `unique_event_link != null` iff this is
/// not `Pending` — enforced at the write path in `relato-pipeline`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupState {
    Pending,
    Matched,
    Clustered,
}

impl DedupState {
    pub fn as_db_str(self) -> &'static str {
        match self {
            DedupState::Pending => "pending",
            DedupState::Matched => "matched",
            DedupState::Clustered => "clustered",
        }
    }
}

impl std::fmt::Display for DedupState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl std::str::FromStr for DedupState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "matched" => Ok(Self::Matched),
            "clustered" => Ok(Self::Clustered),
            other => Err(format!("unknown DedupState: {other}")),
        }
    }
}

/// Classifier confidence tag (§6.4a). Kept as the Portuguese wire values the
/// LLM schema uses; `as_db_str`/`FromStr` round-trip through the store too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTag {
    Alta,
    Media,
    Baixa,
}

impl ConfidenceTag {
    pub fn as_db_str(self) -> &'static str {
        match self {
            ConfidenceTag::Alta => "alta",
            ConfidenceTag::Media => "media",
            ConfidenceTag::Baixa => "baixa",
        }
    }
}

impl std::fmt::Display for ConfidenceTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_db_str())
    }
}

impl std::str::FromStr for ConfidenceTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "alta" => Ok(Self::Alta),
            "média" | "media" => Ok(Self::Media),
            "baixa" => Ok(Self::Baixa),
            other => Err(format!("unknown ConfidenceTag: {other}")),
        }
    }
}

/// Date-precision tag on a `RawEvent`/`UniqueEvent` (§3, §6.4b).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatePrecision {
    Exact,
    Partial,
    Unknown,
}

impl DatePrecision {
    pub fn as_db_str(self) -> &'static str {
        match self {
            DatePrecision::Exact => "exata",
            DatePrecision::Partial => "parcial",
            DatePrecision::Unknown => "nao_informada",
        }
    }
}

impl std::str::FromStr for DatePrecision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exata" => Ok(Self::Exact),
            "parcial" => Ok(Self::Partial),
            "nao_informada" | "não informada" => Ok(Self::Unknown),
            other => Err(format!("unknown DatePrecision: {other}")),
        }
    }
}

/// Geocoding precision tag (§6.5). Unrecognized values from the geocoder
/// capability are normalized to `Approximate` rather than erroring (§9).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeoPrecision {
    Exact,
    Approximate,
    NeighborhoodCenter,
    CityCenter,
}

impl GeoPrecision {
    pub fn from_provider_tag(tag: &str) -> Self {
        match tag {
            "exact" => Self::Exact,
            "approximate" => Self::Approximate,
            "neighborhood_center" => Self::NeighborhoodCenter,
            "city_center" => Self::CityCenter,
            _ => Self::Approximate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_state_round_trips_through_db_string() {
        for state in [
            SourceState::ReadyForClassification,
            SourceState::Classifying,
            SourceState::Discarded,
            SourceState::ReadyForDownload,
            SourceState::Downloading,
            SourceState::FailedInDownload,
            SourceState::ReadyForExtraction,
            SourceState::Extracting,
            SourceState::FailedInExtraction,
            SourceState::Extracted,
        ] {
            let s = state.as_db_str();
            assert_eq!(s.parse::<SourceState>().unwrap(), state);
        }
    }

    #[test]
    fn only_input_states_have_a_claim_state() {
        assert_eq!(
            SourceState::ReadyForClassification.claim_state(),
            Some(SourceState::Classifying)
        );
        assert_eq!(SourceState::Discarded.claim_state(), None);
        assert_eq!(SourceState::Extracted.claim_state(), None);
    }

    #[test]
    fn unrecognized_geo_precision_tag_normalizes_to_approximate() {
        assert_eq!(
            GeoPrecision::from_provider_tag("something_new"),
            GeoPrecision::Approximate
        );
        assert_eq!(GeoPrecision::from_provider_tag("exact"), GeoPrecision::Exact);
    }
}
