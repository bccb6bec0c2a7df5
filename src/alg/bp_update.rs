use crate::{
    factor_types::{binary_factor::BinaryFactor, unary_factor::UnaryFactor},
    mrf::pairwise_mrf::PairwiseMarkovRandomField,
};

// Read-only state shared by every update invocation for the lifetime of a
// run: the edge-compatibility factor, the convergence bound, and the
// damping factor.
pub struct SharedParams {
    pub edge_factor: BinaryFactor,
    pub bound: f64,
    pub damping: f64,
}

// A request to re-schedule a neighbor vertex with priority equal to the
// residual its incoming message just produced
pub type ScheduleRequest = (usize, f64);

// The core belief propagation update for a single vertex.
//
// May read and write this vertex's belief and the message state of its
// incident edges, and nothing else; the engine guarantees that two updates
// of the same vertex never run concurrently. Updates of adjacent vertices
// may run concurrently: the snapshot of incoming messages into old_message
// taken at the start is what keeps the belief recomputation consistent
// while neighbors rewrite the live messages.
pub fn bp_update(
    mrf: &PairwiseMarkovRandomField,
    vertex: usize,
    shared: &SharedParams,
    requests: &mut Vec<ScheduleRequest>,
) {
    // Snapshot every incoming message: since we are about to receive the
    // current message, make it the old message. Local clones let the belief
    // recombination below run without holding any edge lock.
    let mut snapshots: Vec<(usize, UnaryFactor)> = Vec::with_capacity(4);
    for (edge, source) in mrf.in_edges(vertex) {
        let mut messages = mrf.edge_messages(edge).lock();
        messages.old_message = messages.message.clone();
        snapshots.push((source, messages.old_message.clone()));
    }

    // Recompute the belief from the potential and the snapshots
    let mut belief = mrf.potential(vertex).clone();
    for (_, old_message) in snapshots.iter() {
        belief.times(old_message);
    }
    belief.normalize();
    *mrf.vertex_data(vertex).belief().lock() = belief.clone();

    // Recompute every outgoing message from the cavity distribution
    for (out_edge, neighbor) in mrf.out_edges(vertex) {
        let old_message = &snapshots
            .iter()
            .find(|(source, _)| *source == neighbor)
            .expect("Every outgoing edge must be paired with a reverse incoming edge.")
            .1;

        // Remove this neighbor's own contribution so its message cannot
        // reinforce itself
        let mut cavity = belief.clone();
        cavity.divide(old_message);
        cavity.normalize();

        let mut new_message = UnaryFactor::new(neighbor, mrf.arity(neighbor));
        new_message.convolve(&shared.edge_factor, &cavity);
        new_message.normalize();

        let mut messages = mrf.edge_messages(out_edge).lock();
        // Damping references the live outgoing message rather than its
        // snapshot; see the residual against old_message below for the
        // convergence signal.
        new_message.damp(&messages.message, shared.damping);
        let residual = new_message.residual(&messages.old_message);
        messages.message = new_message;
        drop(messages);

        if residual > shared.bound {
            requests.push((neighbor, residual));
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use crate::mrf::grid_builder::{smoothness_prior, SmoothingKind};

    use super::*;

    // Two adjacent variables over three states; variable 0 has a sharp peak
    // at state 1, variable 1 is uninformative.
    fn two_vertex_chain(lambda: f64) -> (PairwiseMarkovRandomField, SharedParams) {
        let mut mrf = PairwiseMarkovRandomField::new();
        let mut peaked = UnaryFactor::new(0, 3);
        peaked[0] = -10.;
        peaked[1] = 0.;
        peaked[2] = -10.;
        peaked.normalize();
        mrf.add_vertex(peaked);
        mrf.add_vertex(UnaryFactor::uniform(1, 3));
        mrf.add_edge(0, 1);
        mrf.add_edge(1, 0);
        mrf.finalize();
        let shared = SharedParams {
            edge_factor: smoothness_prior(SmoothingKind::Square, 3, lambda).unwrap(),
            bound: 1e-6,
            damping: 0.,
        };
        (mrf, shared)
    }

    #[test]
    fn update_snapshots_incoming_messages() {
        let (mrf, shared) = two_vertex_chain(2.);
        let (in_edge, _) = mrf.in_edges(0).next().unwrap();
        {
            let mut messages = mrf.edge_messages(in_edge).lock();
            let var = messages.message.var();
            let mut incoming = UnaryFactor::new(var, 3);
            incoming[2] = 1.;
            incoming.normalize();
            messages.message = incoming;
        }
        let mut requests = Vec::new();
        bp_update(&mrf, 0, &shared, &mut requests);
        let messages = mrf.edge_messages(in_edge).lock();
        assert_eq!(messages.old_message, messages.message);
    }

    #[test]
    fn update_propagates_a_peaked_potential_to_the_neighbor() {
        let (mrf, shared) = two_vertex_chain(5.);
        let mut requests = Vec::new();
        bp_update(&mrf, 0, &shared, &mut requests);

        // The message changed substantially, so the neighbor is re-requested
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].0, 1);
        assert!(requests[0].1 > shared.bound);

        bp_update(&mrf, 1, &shared, &mut requests);
        assert_eq!(mrf.belief(0).max_asg(), 1);
        assert_eq!(mrf.belief(1).max_asg(), 1);
    }

    #[test]
    fn converged_updates_emit_no_requests() {
        let (mrf, shared) = two_vertex_chain(5.);
        let mut requests = Vec::new();
        // Alternate updates until the chain settles
        for _ in 0..20 {
            requests.clear();
            bp_update(&mrf, 0, &shared, &mut requests);
            bp_update(&mrf, 1, &shared, &mut requests);
        }
        requests.clear();
        bp_update(&mrf, 0, &shared, &mut requests);
        bp_update(&mrf, 1, &shared, &mut requests);
        assert!(requests.is_empty());
    }

    #[test]
    fn belief_is_normalized_after_the_update() {
        let (mrf, shared) = two_vertex_chain(1.);
        let mut requests = Vec::new();
        bp_update(&mrf, 0, &shared, &mut requests);
        let belief = mrf.belief(0);
        let sum: f64 = (0..belief.arity()).map(|s| belief[s].exp()).sum();
        assert_relative_eq!(sum, 1., epsilon = 1e-12);
    }

    #[test]
    fn full_damping_freezes_the_outgoing_message() {
        let (mrf, mut shared) = two_vertex_chain(5.);
        shared.damping = 1.;
        let (out_edge, _) = mrf.out_edges(0).next().unwrap();
        let before = mrf.edge_messages(out_edge).lock().message.clone();
        let mut requests = Vec::new();
        bp_update(&mrf, 0, &shared, &mut requests);
        let after = mrf.edge_messages(out_edge).lock().message.clone();
        assert_eq!(before, after);
        assert!(requests.is_empty());
    }
}
