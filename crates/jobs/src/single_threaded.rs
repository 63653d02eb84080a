use crate::JobSystem;

#[derive(Default, Debug, Clone)]
pub struct SingleThreaded;

impl SingleThreaded {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl JobSystem for SingleThreaded {
    fn max_concurrency(&self) -> usize {
        1
    }

    fn for_each(&self, name: &'static str, count: usize, job: &(dyn Fn(usize) + Sync)) {
        let _span = tracing::trace_span!("jobs", name, count).entered();
        for i in 0..count {
            job(i);
        }
    }
}
