//! Case point-pattern CSV (`id,type,time,x,y,tile_id`).

use std::collections::BTreeSet;
use std::io::Read;
use std::path::Path;

use outbreak_models::CaseEvent;

use crate::{IngestError, open};

/// Loads case events from a CSV file.
///
/// # Errors
///
/// Returns an error if the file cannot be opened, a row cannot be parsed,
/// or the rows violate the case invariants (see [`read_cases`]).
pub fn load_cases(path: &Path) -> Result<Vec<CaseEvent>, IngestError> {
    let events = read_cases(open(path)?, &path.display().to_string())?;
    log::info!("Loaded {} cases from {}", events.len(), path.display());
    Ok(events)
}

/// Reads case events from CSV. `source_name` labels errors.
///
/// # Errors
///
/// Returns [`IngestError::Csv`] for a malformed row and
/// [`IngestError::Invalid`] for a duplicate case ID or a non-finite time.
pub fn read_cases<R: Read>(reader: R, source_name: &str) -> Result<Vec<CaseEvent>, IngestError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut seen = BTreeSet::new();
    let mut events = Vec::new();

    for result in reader.deserialize::<CaseEvent>() {
        let event = result.map_err(|source| IngestError::Csv {
            path: source_name.to_string(),
            source,
        })?;

        if !event.time.is_finite() {
            return Err(IngestError::Invalid {
                path: source_name.to_string(),
                message: format!("case {} has a non-finite time", event.id),
            });
        }
        if !seen.insert(event.id) {
            return Err(IngestError::Invalid {
                path: source_name.to_string(),
                message: format!("case ID {} appears more than once", event.id),
            });
        }

        events.push(event);
    }

    Ok(events)
}
