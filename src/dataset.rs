use std::fs::File;
use std::io::{BufReader, Read};

use camino::Utf8Path;
use flate2::read::GzDecoder;
use tracing::debug;

use crate::domain::ProvenanceLabel;
use crate::error::KiraError;
use crate::graph::{Graph, GraphDocument};

/// Loads a dataset graph document, gunzipping `.gz` files. Unreadable or
/// unparsable files are `DatasetUnreadable`; documents that parse but do
/// not form a valid graph are `DatasetInvalid`.
pub fn load_dataset(path: &Utf8Path, label: &ProvenanceLabel) -> Result<Graph, KiraError> {
    let unreadable = |message: String| KiraError::DatasetUnreadable {
        label: label.to_string(),
        message,
    };
    let file = File::open(path).map_err(|err| unreadable(format!("{path}: {err}")))?;
    let reader: Box<dyn Read> = if path.extension() == Some("gz") {
        Box::new(GzDecoder::new(BufReader::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };
    let graph = parse_dataset(reader, label)?;
    debug!(dataset = %label, path = %path, nodes = graph.len(), "loaded dataset");
    Ok(graph)
}

pub fn parse_dataset<R: Read>(reader: R, label: &ProvenanceLabel) -> Result<Graph, KiraError> {
    let document: GraphDocument =
        serde_json::from_reader(reader).map_err(|err| KiraError::DatasetUnreadable {
            label: label.to_string(),
            message: err.to_string(),
        })?;
    Graph::from_document(document).map_err(|err| KiraError::DatasetInvalid {
        label: label.to_string(),
        message: err.to_string(),
    })
}
