/// Exclusive right to use the transport.
///
/// Exactly one exists per manager. It is moved into the prober while it
/// runs and into the upload while one is in flight, so the two can never
/// hold the transport at the same time.
#[derive(Debug)]
pub(crate) struct TransportChannel {
    _private: (),
}

impl TransportChannel {
    pub(crate) fn new() -> Self {
        Self { _private: () }
    }
}
