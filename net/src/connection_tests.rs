//! Connection table tests: lookup reflects exactly the live records.

use alloc::sync::Arc;

use crate::connection::{ConnectionTable, PortPair};
use crate::types::Port;

struct FakeConn {
    local: Port,
    remote: Port,
}

impl PortPair for FakeConn {
    fn local_port(&self) -> Port {
        self.local
    }

    fn remote_port(&self) -> Port {
        self.remote
    }
}

fn conn(local: u16, remote: u16) -> FakeConn {
    FakeConn {
        local: Port(local),
        remote: Port(remote),
    }
}

#[test]
fn get_returns_some_iff_a_live_record_matches() {
    let table: ConnectionTable<FakeConn> = ConnectionTable::new();

    assert!(table.get(Port(1024), Port(80)).is_none());

    let a = table.insert(conn(1024, 80));
    let b = table.insert(conn(1025, 80));

    assert!(table.get(Port(1024), Port(80)).is_some());
    assert!(table.get(Port(1025), Port(80)).is_some());
    assert!(table.get(Port(1024), Port(81)).is_none());
    assert!(table.get(Port(1026), Port(80)).is_none());

    table.remove(&a);
    assert!(table.get(Port(1024), Port(80)).is_none());
    assert!(table.get(Port(1025), Port(80)).is_some());

    table.remove(&b);
    assert!(table.is_empty());
}

#[test]
fn handles_stay_valid_across_unrelated_mutations() {
    let table: ConnectionTable<FakeConn> = ConnectionTable::new();

    let a = table.insert(conn(2000, 7));
    let held = table.get(Port(2000), Port(7)).unwrap();

    // Churn the table around the held record.
    for port in 3000..3010 {
        let c = table.insert(conn(port, 7));
        table.remove(&c);
    }

    assert!(Arc::ptr_eq(&held, &a));
    assert_eq!(held.local_port(), Port(2000));
}

#[test]
fn remove_is_by_identity() {
    let table: ConnectionTable<FakeConn> = ConnectionTable::new();

    let a = table.insert(conn(4000, 9));
    let twin = table.insert(conn(4000, 9));

    table.remove(&a);
    // The twin with identical ports survives.
    assert!(table.get(Port(4000), Port(9)).is_some());
    table.remove(&twin);
    assert!(table.get(Port(4000), Port(9)).is_none());
}
