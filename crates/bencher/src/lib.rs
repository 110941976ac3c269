#[derive(Debug, Copy, Clone)]
pub struct TestCase {
    name: &'static str,
    group: TestGroup,
    load: TestLoad,
}

impl TestCase {
    pub fn new(name: &'static str, group: TestGroup, load: TestLoad) -> Self {
        Self { name, group, load }
    }

    pub fn small(name: &'static str, load: TestLoad) -> Self {
        Self::new(name, TestGroup::Small, load)
    }

    pub fn normal(name: &'static str, load: TestLoad) -> Self {
        Self::new(name, TestGroup::Normal, load)
    }

    pub fn large(name: &'static str, load: TestLoad) -> Self {
        Self::new(name, TestGroup::Large, load)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn group(&self) -> TestGroup {
        self.group
    }

    pub fn load(&self) -> &TestLoad {
        &self.load
    }
}

/// How many transfers run at once, and what each of them receives.
#[derive(Debug, Copy, Clone)]
pub struct TestLoad {
    transfers: usize,
    chunks: usize,
    chunk_size: usize,
}

impl TestLoad {
    pub const fn new(transfers: usize, chunks: usize, chunk_size: usize) -> Self {
        Self { transfers, chunks, chunk_size }
    }

    pub fn transfers(&self) -> usize {
        self.transfers
    }

    pub fn chunks(&self) -> usize {
        self.chunks
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Body bytes received across all transfers
    pub fn total_bytes(&self) -> u64 {
        (self.transfers * self.chunks * self.chunk_size) as u64
    }

    /// Events yielded across all transfers, one data event per chunk plus one done each
    pub fn total_events(&self) -> u64 {
        (self.transfers * (self.chunks + 1)) as u64
    }
}

#[derive(Clone, Copy, Debug)]
pub enum TestGroup {
    Small,
    Normal,
    Large,
}
