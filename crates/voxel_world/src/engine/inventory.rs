//! Inventory arithmetic.
//!
//! Inventories are `BTreeMap<String, i64>` with the invariant that stored
//! counts are strictly positive; zero-count keys are removed on the spot.

use std::collections::BTreeMap;

use voxel_world_proto::ItemStack;

pub type Inventory = BTreeMap<String, i64>;

pub fn count(inv: &Inventory, item: &str) -> i64 {
    inv.get(item).copied().unwrap_or(0)
}

pub fn add(inv: &mut Inventory, item: &str, n: i64) {
    if item.is_empty() || n <= 0 {
        return;
    }
    *inv.entry(item.to_string()).or_insert(0) += n;
}

/// Removes up to `n` of `item`; returns how many were actually removed.
pub fn take(inv: &mut Inventory, item: &str, n: i64) -> i64 {
    if n <= 0 {
        return 0;
    }
    let have = count(inv, item);
    let taken = have.min(n);
    if taken <= 0 {
        return 0;
    }
    if have == taken {
        inv.remove(item);
    } else if let Some(c) = inv.get_mut(item) {
        *c -= taken;
    }
    taken
}

pub fn has_all(inv: &Inventory, want: &Inventory) -> bool {
    want.iter().all(|(item, n)| count(inv, item) >= *n)
}

/// Moves `items` from `src` to `dst`, siphoning `floor(count * tax_rate)` of
/// every stack into `tax_sink` when a sink is given.
pub fn transfer_with_tax(
    src: &mut Inventory,
    dst: &mut Inventory,
    items: &Inventory,
    tax_sink: Option<&mut Inventory>,
    tax_rate: f64,
) {
    let rate = tax_rate.clamp(0.0, 1.0);
    let mut sink = tax_sink;
    for (item, &n) in items {
        if n <= 0 {
            continue;
        }
        take(src, item, n);
        let tax = if rate > 0.0 {
            ((n as f64) * rate).floor() as i64
        } else {
            0
        }
        .clamp(0, n);
        add(dst, item, n - tax);
        if tax > 0 {
            if let Some(sink) = sink.as_deref_mut() {
                add(sink, item, tax);
            }
        }
    }
}

/// Per-item tax amounts for an item map at `tax_rate`; empty when no tax.
pub fn calc_tax(items: &Inventory, tax_rate: f64) -> Inventory {
    let rate = tax_rate.clamp(0.0, 1.0);
    let mut out = Inventory::new();
    if rate <= 0.0 {
        return out;
    }
    for (item, &n) in items {
        if n <= 0 {
            continue;
        }
        let tax = ((n as f64) * rate).floor() as i64;
        if tax > 0 {
            out.insert(item.clone(), tax.min(n));
        }
    }
    out
}

pub fn sorted_stacks(inv: &Inventory) -> Vec<ItemStack> {
    inv.iter()
        .filter(|(_, &n)| n > 0)
        .map(|(item, &n)| ItemStack {
            item: item.clone(),
            count: n,
        })
        .collect()
}

pub fn stacks_to_map(stacks: &[ItemStack]) -> Option<Inventory> {
    let mut out = Inventory::new();
    for s in stacks {
        if s.item.is_empty() || s.count <= 0 {
            return None;
        }
        *out.entry(s.item.clone()).or_insert(0) += s.count;
    }
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

pub fn stacks_json(inv: &Inventory) -> serde_json::Value {
    let pairs: Vec<serde_json::Value> = inv
        .iter()
        .filter(|(_, &n)| n > 0)
        .map(|(item, &n)| serde_json::json!([item, n]))
        .collect();
    serde_json::Value::Array(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_normalizes_zero_counts() {
        let mut inv = Inventory::new();
        add(&mut inv, "PLANK", 3);
        assert_eq!(take(&mut inv, "PLANK", 3), 3);
        assert!(!inv.contains_key("PLANK"));
        assert_eq!(take(&mut inv, "PLANK", 1), 0);
    }

    #[test]
    fn tax_floors_per_item() {
        let mut src = Inventory::from([("PLANK".to_string(), 10)]);
        let mut dst = Inventory::new();
        let mut sink = Inventory::new();
        let items = Inventory::from([("PLANK".to_string(), 10)]);
        transfer_with_tax(&mut src, &mut dst, &items, Some(&mut sink), 0.10);
        assert_eq!(count(&dst, "PLANK"), 9);
        assert_eq!(count(&sink, "PLANK"), 1);
        assert!(src.is_empty());
    }
}
