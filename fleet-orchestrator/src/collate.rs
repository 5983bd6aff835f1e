use fleet_common::{sort_instances, ErrorKind, Instance};
use std::collections::BTreeMap;

/// Group bad instances by error kind.
///
/// An instance carrying N errors yields N entries, one per error, so a kind
/// repeated on the same instance lists it that many times.
pub fn collate_errors(bad: &[Instance]) -> BTreeMap<ErrorKind, Vec<Instance>> {
    let mut out: BTreeMap<ErrorKind, Vec<Instance>> = BTreeMap::new();

    for vm in bad {
        for err in &vm.errors {
            out.entry(err.kind).or_default().push(vm.clone());
        }
    }

    for bucket in out.values_mut() {
        sort_instances(bucket);
    }
    out
}
