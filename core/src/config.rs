//! Engine configuration

/// How the fire loop treats activations invalidated during the same cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AgendaMode {
    /// Skip activations whose facts were deleted by an earlier RHS in the
    /// same cycle.
    #[default]
    Default,
    /// Fire every activation computed at the start of the cycle.
    Continuous,
}

/// Configuration shared by a knowledge template and the sessions it spawns.
#[derive(Debug, Clone)]
pub struct Configuration {
    /// Agenda behavior within a cycle
    pub agenda_mode: AgendaMode,
    /// Stop with an error after this many cycles in one `fire()` call
    pub max_cycles: Option<u64>,
    /// Capacity hint for per-type fact storage
    pub expected_facts_per_type: usize,
    /// Log inserts of objects whose type is not registered
    pub warn_unknown_types: bool,
    /// Declare a logical type on first insert of an unregistered native type
    pub auto_declare_types: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            agenda_mode: AgendaMode::Default,
            max_cycles: None,
            expected_facts_per_type: 64,
            warn_unknown_types: true,
            auto_declare_types: false,
        }
    }
}

impl Configuration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_agenda_mode(mut self, mode: AgendaMode) -> Self {
        self.agenda_mode = mode;
        self
    }

    pub fn with_max_cycles(mut self, cycles: u64) -> Self {
        self.max_cycles = Some(cycles);
        self
    }

    pub fn with_expected_facts_per_type(mut self, count: usize) -> Self {
        self.expected_facts_per_type = count;
        self
    }

    pub fn with_warn_unknown_types(mut self, warn: bool) -> Self {
        self.warn_unknown_types = warn;
        self
    }

    pub fn with_auto_declare_types(mut self, auto: bool) -> Self {
        self.auto_declare_types = auto;
        self
    }

    /// Small footprint, no logging of skipped inserts. Handy in tests.
    pub fn minimal() -> Self {
        Self {
            agenda_mode: AgendaMode::Default,
            max_cycles: Some(1_000),
            expected_facts_per_type: 4,
            warn_unknown_types: false,
            auto_declare_types: false,
        }
    }
}
