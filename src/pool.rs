use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

/// Maps `f` over `items` on `min(workers, items.len())` threads. Results are
/// returned in input order.
pub fn parallel_map<T, R, F>(items: &[T], workers: usize, f: F) -> Vec<R>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    let workers = workers.max(1).min(items.len());
    if workers <= 1 {
        return items.iter().map(&f).collect();
    }

    let next = AtomicUsize::new(0);
    let results: Mutex<Vec<Option<R>>> = Mutex::new((0..items.len()).map(|_| None).collect());

    thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| {
                loop {
                    let index = next.fetch_add(1, Ordering::Relaxed);
                    let Some(item) = items.get(index) else {
                        break;
                    };
                    let value = f(item);
                    if let Ok(mut slots) = results.lock() {
                        slots[index] = Some(value);
                    }
                }
            });
        }
    });

    results
        .into_inner()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .into_iter()
        .flatten()
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn preserves_order() {
        let items = (0..100).collect::<Vec<u32>>();
        let doubled = parallel_map(&items, 7, |value| value * 2);
        assert_eq!(doubled, items.iter().map(|v| v * 2).collect::<Vec<_>>());
    }

    #[test]
    fn uses_at_most_worker_count_threads() {
        let items = (0..50).collect::<Vec<u32>>();
        let seen = Mutex::new(HashSet::new());
        parallel_map(&items, 3, |_| {
            seen.lock().unwrap().insert(thread::current().id());
        });
        assert!(seen.lock().unwrap().len() <= 3);
    }

    #[test]
    fn empty_input() {
        let items: Vec<u32> = Vec::new();
        assert!(parallel_map(&items, 4, |v| *v).is_empty());
    }
}
