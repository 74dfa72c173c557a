use std::alloc::{GlobalAlloc, Layout, System};
use std::sync::atomic::{AtomicUsize, Ordering};

use rand::SeedableRng;
use rand::rngs::StdRng;
use reservoir_mlp::{
    Activation, HiddenLayerConfig, MlpEngine, NetworkModelConfig, Synapse, SynapseSource,
    TaskType,
};

struct CountingAlloc {
    allocs: AtomicUsize,
    reallocs: AtomicUsize,
}

impl CountingAlloc {
    const fn new() -> Self {
        Self {
            allocs: AtomicUsize::new(0),
            reallocs: AtomicUsize::new(0),
        }
    }

    fn reset(&self) {
        self.allocs.store(0, Ordering::Relaxed);
        self.reallocs.store(0, Ordering::Relaxed);
    }

    fn alloc_events(&self) -> usize {
        self.allocs.load(Ordering::Relaxed) + self.reallocs.load(Ordering::Relaxed)
    }
}

unsafe impl GlobalAlloc for CountingAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        self.allocs.fetch_add(1, Ordering::Relaxed);
        unsafe { System.alloc(layout) }
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        self.allocs.fetch_add(1, Ordering::Relaxed);
        unsafe { System.alloc_zeroed(layout) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) }
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        self.reallocs.fetch_add(1, Ordering::Relaxed);
        unsafe { System.realloc(ptr, layout, new_size) }
    }
}

#[global_allocator]
static ALLOC: CountingAlloc = CountingAlloc::new();

#[test]
fn hot_paths_do_not_allocate() {
    let cfg = NetworkModelConfig {
        hidden_layers: vec![
            HiddenLayerConfig::new(64, Activation::TanH),
            HiddenLayerConfig::new(32, Activation::ReLU),
        ],
        ..NetworkModelConfig::default()
    };
    let names = (0..8).map(|i| format!("class{i}")).collect();
    let mut engine = MlpEngine::new(TaskType::Categorical, 32, names, &cfg).unwrap();
    engine.randomize_weights(&mut StdRng::seed_from_u64(0));

    let mut activations = vec![0.0; engine.num_flat_nodes()];
    let mut sums = vec![0.0; engine.num_flat_nodes()];
    let input = vec![0.1; engine.num_inputs()];
    let mut synapse = Synapse::new(SynapseSource::Hidden(0), 0.5, 4);

    ALLOC.reset();
    let mut checksum = 0.0;
    for step in 0..1000 {
        let start = engine.compute_into(&input, &mut activations, &mut sums);
        checksum += activations[start];
        checksum += synapse.pull(step as f64);
    }
    let events = ALLOC.alloc_events();

    assert!(checksum.is_finite());
    assert_eq!(events, 0, "hot paths allocated {events} times");
}
