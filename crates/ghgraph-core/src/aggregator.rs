//! Fan-in of provider outputs into one record set per type.

use tracing::debug;

use crate::invoker::ProviderOutput;
use crate::records::{AggregatedRecords, TaggedRecord};

/// Concatenate every provider's records by type name.
///
/// Groups keep provider order, then each provider's own record order. Type
/// names the registry does not know are kept here; the materializer decides
/// what to drop.
pub fn aggregate(outputs: Vec<ProviderOutput>) -> AggregatedRecords {
    let mut aggregated = AggregatedRecords::default();
    for output in outputs {
        for (type_name, records) in output.records {
            debug!(
                provider = %output.provenance.provider_name,
                type_name = %type_name,
                count = records.len(),
                "aggregating"
            );
            let group = aggregated.groups.entry(type_name).or_default();
            group.extend(records.into_iter().map(|record| TaggedRecord {
                record,
                provenance: output.provenance.clone(),
            }));
        }
    }
    aggregated
}
