// Particle kernels and single-species container behavior

use super::push::{courant_dt, push_momentum_boris, push_momentum_es, push_position};
use super::shape::CicStencil;
use super::*;
use crate::config::{BoundaryPolicy, InjectionProfile, MeshConfig};
use crate::error::PicError;
use crate::mesh::{build_levels, BoxArray, DistributionMap, LevelLayout, MeshField};
use crate::parallel::{Communicator, SerialComm, ThreadComm};
use crate::units::{lorentz_factor, ELECTRON_MASS, ELEMENTARY_CHARGE};
use approx::assert_relative_eq;

/// 8x4x4 unit cells, two boxes along x.
fn layouts(periodic: [bool; 3], nranks: usize) -> Vec<LevelLayout> {
    let mesh = MeshConfig {
        n_cell: [8, 4, 4],
        max_grid_size: 4,
        prob_lo: [0.0; 3],
        prob_hi: [8.0, 4.0, 4.0],
        periodic,
        ngrow: 1,
        refined_regions: Vec::new(),
    };
    build_levels(&mesh, nranks).unwrap()
}

fn electrons(layouts: &[LevelLayout], boundary: BoundaryPolicy, rank: usize, nranks: usize) -> ParticleContainer {
    let mut pc = ParticleContainer::new(
        "electrons",
        -ELEMENTARY_CHARGE,
        ELECTRON_MASS,
        boundary,
        layouts,
        rank,
        nranks,
    );
    pc.alloc_data();
    pc
}

fn thermal_profile() -> InjectionProfile {
    InjectionProfile {
        density: 1.0e6,
        ppc: [2, 1, 1],
        u_thermal: [1.0e5, 2.0e5, 3.0e5],
        ..Default::default()
    }
}

#[cfg(test)]
mod kernels {
    use super::*;

    #[test]
    fn cic_weights_sum_to_one() {
        let l = &layouts([true; 3], 1)[0];
        for pos in [[0.1, 0.2, 0.3], [3.99, 1.5, 2.75], [7.5, 3.5, 3.5]] {
            let stencil = CicStencil::new(pos, &l.geom);
            let mut total = 0.0;
            stencil.for_each(|_, w| total += w);
            assert_relative_eq!(total, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn particle_at_cell_center_hits_one_cell() {
        let l = &layouts([true; 3], 1)[0];
        let stencil = CicStencil::new([2.5, 1.5, 0.5], &l.geom);
        let mut hits = Vec::new();
        stencil.for_each(|cell, w| {
            if w > 0.0 {
                hits.push((cell, w));
            }
        });
        assert_eq!(hits, vec![([2, 1, 0], 1.0)]);
    }

    #[test]
    fn boris_without_magnetic_field_matches_electric_push() {
        let (q, m, dt) = (-ELEMENTARY_CHARGE, ELECTRON_MASS, 1.0e-12);
        let u0 = [1.0e6, -2.0e5, 0.0];
        let e = [1.0e3, 0.0, -5.0e2];
        let boris = push_momentum_boris(u0, e, [0.0; 3], q, m, dt);
        let es = push_momentum_es(u0, e, q, m, dt);
        for d in 0..3 {
            assert_relative_eq!(boris[d], es[d], max_relative = 1e-12);
        }
    }

    #[test]
    fn boris_rotation_conserves_energy() {
        let (q, m, dt) = (-ELEMENTARY_CHARGE, ELECTRON_MASS, 1.0e-13);
        let mut u = [2.0e7, 0.0, 1.0e7];
        let gamma0 = lorentz_factor(u);
        for _ in 0..1000 {
            u = push_momentum_boris(u, [0.0; 3], [0.0, 0.0, 1.0], q, m, dt);
        }
        assert_relative_eq!(lorentz_factor(u), gamma0, max_relative = 1e-12);
        assert_relative_eq!(u[2], 1.0e7, max_relative = 1e-12);
    }

    #[test]
    fn position_push_uses_velocity() {
        let mut pos = [0.0; 3];
        let u = [3.0e8, 0.0, 0.0];
        push_position(&mut pos, u, 1.0e-9);
        assert!(pos[0] < 0.299_792_458);
        assert_relative_eq!(pos[0], 3.0e8 / lorentz_factor(u) * 1.0e-9, max_relative = 1e-12);
    }

    #[test]
    fn courant_step_scales_with_cfl() {
        let dx = [1.0e-6, 2.0e-6, 2.0e-6];
        assert_relative_eq!(courant_dt(dx, 0.5), 0.5 * courant_dt(dx, 1.0));
        assert!(courant_dt(dx, 1.0) < dx[0] / crate::units::SPEED_OF_LIGHT);
    }
}

#[cfg(test)]
mod injection {
    use super::*;

    #[test]
    fn fills_every_cell_with_ppc_particles() {
        let layouts = layouts([true; 3], 1);
        let mut pc = electrons(&layouts, BoundaryPolicy::Absorb, 0, 1);
        let n = pc.inject_uniform(&thermal_profile(), 7).unwrap();
        assert_eq!(n, 8 * 4 * 4 * 2);
        assert_eq!(pc.num_local(), n);
        assert_relative_eq!(pc.sum_charge(), -ELEMENTARY_CHARGE * 1.0e6 * 128.0, epsilon = 1e-30, max_relative = 1e-12);
        assert_eq!(pc.counts(0).unwrap(), vec![64, 64]);
    }

    #[test]
    fn zero_density_injects_nothing() {
        let layouts = layouts([true; 3], 1);
        let mut pc = electrons(&layouts, BoundaryPolicy::Absorb, 0, 1);
        assert_eq!(pc.inject_uniform(&InjectionProfile::default(), 7).unwrap(), 0);
    }

    #[test]
    fn region_limits_the_plasma() {
        let layouts = layouts([true; 3], 1);
        let mut pc = electrons(&layouts, BoundaryPolicy::Absorb, 0, 1);
        let profile = InjectionProfile {
            region_lo: Some([0.0, 0.0, 0.0]),
            region_hi: Some([2.0, 4.0, 4.0]),
            ..thermal_profile()
        };
        assert_eq!(pc.inject_uniform(&profile, 7).unwrap(), 2 * 4 * 4 * 2);
        assert!(pc.iter().all(|p| p.pos[0] < 2.0));
    }

    #[test]
    fn initial_state_is_independent_of_decomposition() {
        fn snapshot(pc: &ParticleContainer) -> Vec<(u64, [f64; 3], [f64; 3])> {
            pc.iter().map(|p| (p.id, p.pos, p.mom)).collect()
        }

        let single = {
            let layouts = layouts([true; 3], 1);
            let mut pc = electrons(&layouts, BoundaryPolicy::Absorb, 0, 1);
            pc.inject_uniform(&thermal_profile(), 42).unwrap();
            let mut s = snapshot(&pc);
            s.sort_by_key(|e| e.0);
            s
        };

        let mut split: Vec<_> = ThreadComm::run(2, |comm| {
            let layouts = layouts([true; 3], comm.size());
            let mut pc = electrons(&layouts, BoundaryPolicy::Absorb, comm.rank(), comm.size());
            pc.inject_uniform(&thermal_profile(), 42).unwrap();
            snapshot(&pc)
        })
        .into_iter()
        .flatten()
        .collect();
        split.sort_by_key(|e| e.0);

        assert_eq!(split, single);
        let mut ids: Vec<_> = single.iter().map(|e| e.0).collect();
        ids.dedup();
        assert_eq!(ids.len(), single.len());
    }

    #[test]
    fn different_seeds_give_different_momenta() {
        let layouts = layouts([true; 3], 1);
        let mut a = electrons(&layouts, BoundaryPolicy::Absorb, 0, 1);
        let mut b = electrons(&layouts, BoundaryPolicy::Absorb, 0, 1);
        a.inject_uniform(&thermal_profile(), 1).unwrap();
        b.inject_uniform(&thermal_profile(), 2).unwrap();
        assert!(a.iter().zip(b.iter()).any(|(p, q)| p.mom != q.mom));
    }
}

#[cfg(test)]
mod deposition {
    use super::*;

    #[test]
    fn charge_deposit_conserves_total_charge() {
        let layouts = layouts([true; 3], 1);
        let l = &layouts[0];
        let mut pc = electrons(&layouts, BoundaryPolicy::Absorb, 0, 1);
        pc.add_local(0, 0, Particle::new([2.0, 2.0, 2.0], [0.0; 3], 3.0, 1)).unwrap();
        pc.add_local(0, 0, Particle::new([0.2, 0.1, 3.9], [0.0; 3], 1.0, 2)).unwrap();

        let mut rho = MeshField::new(&l.ba, &l.dm, 1, 1, 0);
        pc.deposit_charge_on(0, &mut rho, 0, false).unwrap();
        rho.sum_boundary(&l.geom, &SerialComm).unwrap();

        let total = rho.sum_valid(0, &SerialComm).unwrap() * l.geom.cell_volume();
        assert_relative_eq!(total, pc.sum_charge(), epsilon = 1e-30, max_relative = 1e-12);
    }

    #[test]
    fn previous_position_deposit_uses_prev_pos() {
        let layouts = layouts([true; 3], 1);
        let l = &layouts[0];
        let mut pc = electrons(&layouts, BoundaryPolicy::Absorb, 0, 1);
        let mut p = Particle::new([2.5, 2.5, 2.5], [0.0; 3], 1.0, 1);
        p.prev_pos = [1.5, 2.5, 2.5];
        pc.add_local(0, 0, p).unwrap();

        let mut rho = MeshField::new(&l.ba, &l.dm, 2, 1, 0);
        pc.deposit_charge_on(0, &mut rho, 0, true).unwrap();
        pc.deposit_charge_on(0, &mut rho, 1, false).unwrap();
        assert_relative_eq!(rho.value_at([1, 2, 2], 0).unwrap() / ELEMENTARY_CHARGE, -1.0);
        assert_relative_eq!(rho.value_at([2, 2, 2], 1).unwrap() / ELEMENTARY_CHARGE, -1.0);
        assert_eq!(rho.value_at([2, 2, 2], 0), Some(0.0));
    }

    #[test]
    fn current_matches_charge_times_velocity() {
        let layouts = layouts([true; 3], 1);
        let l = &layouts[0];
        let mut pc = electrons(&layouts, BoundaryPolicy::Absorb, 0, 1);
        pc.add_local(0, 0, Particle::new([1.0, 1.0, 1.0], [1.0e6, 0.0, -2.0e6], 2.0, 1)).unwrap();
        pc.push_position_on(0, 1.0e-7).unwrap();

        let mut j = MeshField::new(&l.ba, &l.dm, 3, 1, 0);
        pc.deposit_current_on(0, &mut j).unwrap();
        j.sum_boundary(&l.geom, &SerialComm).unwrap();

        let v = crate::units::velocity([1.0e6, 0.0, -2.0e6]);
        let qw = -ELEMENTARY_CHARGE * 2.0;
        assert_relative_eq!(j.sum_valid(0, &SerialComm).unwrap(), qw * v[0], epsilon = 1e-30, max_relative = 1e-12);
        assert_eq!(j.sum_valid(1, &SerialComm).unwrap(), 0.0);
        assert_relative_eq!(j.sum_valid(2, &SerialComm).unwrap(), qw * v[2], epsilon = 1e-30, max_relative = 1e-12);
    }

    #[test]
    fn current_needs_three_components() {
        let layouts = layouts([true; 3], 1);
        let l = &layouts[0];
        let pc = electrons(&layouts, BoundaryPolicy::Absorb, 0, 1);
        let mut j = MeshField::new(&l.ba, &l.dm, 1, 1, 0);
        assert!(matches!(pc.deposit_current_on(0, &mut j), Err(PicError::IncompatibleField(_))));
    }

    #[test]
    fn stencil_past_the_ghost_region_is_reported() {
        let layouts = layouts([true; 3], 1);
        let l = &layouts[0];
        let mut pc = electrons(&layouts, BoundaryPolicy::Absorb, 0, 1);
        pc.add_local(0, 0, Particle::new([4.9, 1.0, 1.0], [1.0e6, 0.0, 0.0], 1.0, 7)).unwrap();

        let mut rho = MeshField::new(&l.ba, &l.dm, 1, 1, 0);
        let err = pc.deposit_charge_on(0, &mut rho, 0, false).unwrap_err();
        assert!(matches!(err, PicError::DepositOutsideGhosts { field: "rho", dropped: 4, .. }));
        let mut j = MeshField::new(&l.ba, &l.dm, 3, 1, 0);
        let err = pc.deposit_current_on(0, &mut j).unwrap_err();
        assert!(matches!(err, PicError::DepositOutsideGhosts { field: "J", .. }));

        // one more ghost layer holds the whole stencil
        let mut rho = MeshField::new(&l.ba, &l.dm, 1, 2, 0);
        pc.deposit_charge_on(0, &mut rho, 0, false).unwrap();
        rho.sum_boundary(&l.geom, &SerialComm).unwrap();
        let total = rho.sum_valid(0, &SerialComm).unwrap() * l.geom.cell_volume();
        assert_relative_eq!(total / ELEMENTARY_CHARGE, -1.0, max_relative = 1e-12);
    }

    #[test]
    fn charge_component_must_exist() {
        let layouts = layouts([true; 3], 1);
        let l = &layouts[0];
        let mut pc = electrons(&layouts, BoundaryPolicy::Absorb, 0, 1);
        pc.add_local(0, 0, Particle::new([1.0, 1.0, 1.0], [0.0; 3], 1.0, 1)).unwrap();
        let mut rho = MeshField::new(&l.ba, &l.dm, 1, 1, 0);
        assert!(matches!(pc.deposit_charge_on(0, &mut rho, 1, false), Err(PicError::IncompatibleField(_))));
    }

    #[test]
    fn gather_needs_three_components() {
        let layouts = layouts([true; 3], 1);
        let l = &layouts[0];
        let mut pc = electrons(&layouts, BoundaryPolicy::Absorb, 0, 1);
        pc.add_local(0, 0, Particle::new([1.0, 1.0, 1.0], [0.0; 3], 1.0, 1)).unwrap();
        let scalar = MeshField::new(&l.ba, &l.dm, 1, 1, 0);
        let vector = MeshField::new(&l.ba, &l.dm, 3, 1, 0);
        assert!(matches!(pc.gather(0, &scalar, None), Err(PicError::IncompatibleField(_))));
        assert!(matches!(pc.gather(0, &vector, Some(&scalar)), Err(PicError::IncompatibleField(_))));
        pc.gather(0, &vector, Some(&vector)).unwrap();
    }

    #[test]
    fn deposit_is_repeatable_for_large_tiles() {
        let layouts = layouts([true; 3], 1);
        let l = &layouts[0];
        let mut pc = electrons(&layouts, BoundaryPolicy::Absorb, 0, 1);
        let profile = InjectionProfile { ppc: [8, 8, 4], ..thermal_profile() };
        pc.inject_uniform(&profile, 3).unwrap();
        pc.push_position(1.0e-7);

        let deposit = || {
            let mut rho = MeshField::new(&l.ba, &l.dm, 1, 2, 0);
            pc.deposit_charge_on(0, &mut rho, 0, false).unwrap();
            rho
        };
        assert_eq!(deposit(), deposit());
    }

    #[test]
    fn increment_counts_particles_per_cell() {
        let layouts = layouts([true; 3], 1);
        let l = &layouts[0];
        let mut pc = electrons(&layouts, BoundaryPolicy::Absorb, 0, 1);
        pc.add_local(0, 1, Particle::new([5.2, 0.5, 0.5], [0.0; 3], 1.0, 1)).unwrap();
        pc.add_local(0, 1, Particle::new([5.7, 0.1, 0.9], [0.0; 3], 1.0, 2)).unwrap();
        let mut count = MeshField::new(&l.ba, &l.dm, 1, 0, 0);
        pc.increment(&mut count, 0).unwrap();
        assert_eq!(count.value_at([5, 0, 0], 0), Some(2.0));
        assert_eq!(pc.counts(0).unwrap(), vec![0, 2]);
    }
}

#[cfg(test)]
mod redistribution {
    use super::*;

    #[test]
    fn local_mode_moves_particles_between_neighbouring_boxes() {
        let layouts = layouts([true; 3], 1);
        let mut pc = electrons(&layouts, BoundaryPolicy::Absorb, 0, 1);
        pc.add_local(0, 0, Particle::new([4.5, 1.0, 1.0], [0.0; 3], 1.0, 1)).unwrap();
        let stats = pc.redistribute(RedistributeMode::Local { num_ghost: 1 }, &SerialComm).unwrap();
        assert_eq!(stats.kept, 1);
        assert_eq!(pc.counts(0).unwrap(), vec![0, 1]);
    }

    #[test]
    fn local_mode_rejects_particles_beyond_the_ghost_width() {
        let layouts = layouts([true; 3], 1);
        let mut pc = electrons(&layouts, BoundaryPolicy::Absorb, 0, 1);
        pc.add_local(0, 0, Particle::new([6.5, 1.0, 1.0], [0.0; 3], 1.0, 9)).unwrap();
        let err = pc.redistribute(RedistributeMode::Local { num_ghost: 1 }, &SerialComm).unwrap_err();
        match err {
            PicError::RedistributeOutOfRange { id, from_box, cell, .. } => {
                assert_eq!(id, 9);
                assert_eq!(from_box, 0);
                assert_eq!(cell, [6, 1, 1]);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn full_mode_accepts_any_displacement() {
        let layouts = layouts([true; 3], 1);
        let mut pc = electrons(&layouts, BoundaryPolicy::Absorb, 0, 1);
        pc.add_local(0, 0, Particle::new([6.5, 1.0, 1.0], [0.0; 3], 1.0, 9)).unwrap();
        pc.redistribute(RedistributeMode::Full, &SerialComm).unwrap();
        assert_eq!(pc.counts(0).unwrap(), vec![0, 1]);
    }

    #[test]
    fn periodic_axes_wrap_positions() {
        let layouts = layouts([true; 3], 1);
        let mut pc = electrons(&layouts, BoundaryPolicy::Absorb, 0, 1);
        pc.add_local(0, 0, Particle::new([-0.5, 1.0, 4.5], [0.0; 3], 1.0, 1)).unwrap();
        pc.redistribute(RedistributeMode::Local { num_ghost: 1 }, &SerialComm).unwrap();
        let p = pc.iter().next().unwrap();
        assert_relative_eq!(p.pos[0], 7.5);
        assert_relative_eq!(p.pos[2], 0.5);
        assert_eq!(pc.counts(0).unwrap(), vec![0, 1]);
    }

    #[test]
    fn absorbing_walls_remove_particles() {
        let layouts = layouts([false, true, true], 1);
        let mut pc = electrons(&layouts, BoundaryPolicy::Absorb, 0, 1);
        pc.add_local(0, 0, Particle::new([-0.5, 1.0, 1.0], [0.0; 3], 1.0, 1)).unwrap();
        pc.add_local(0, 0, Particle::new([0.5, 1.0, 1.0], [0.0; 3], 1.0, 2)).unwrap();
        let stats = pc.redistribute(RedistributeMode::Local { num_ghost: 1 }, &SerialComm).unwrap();
        assert_eq!(stats.absorbed, 1);
        assert_eq!(pc.num_local(), 1);
        assert_eq!(pc.iter().next().unwrap().id, 2);
    }

    #[test]
    fn reflecting_walls_mirror_position_and_momentum() {
        let layouts = layouts([false, true, true], 1);
        let mut pc = electrons(&layouts, BoundaryPolicy::Reflect, 0, 1);
        pc.add_local(0, 1, Particle::new([8.25, 1.0, 1.0], [1.0e5, 2.0e5, 0.0], 1.0, 1)).unwrap();
        pc.redistribute(RedistributeMode::Local { num_ghost: 1 }, &SerialComm).unwrap();
        let p = pc.iter().next().unwrap();
        assert_relative_eq!(p.pos[0], 7.75);
        assert_eq!(p.mom, [-1.0e5, 2.0e5, 0.0]);
    }

    #[test]
    fn particles_travel_to_the_owning_rank() {
        let results = ThreadComm::run(2, |comm| {
            let layouts = layouts([true; 3], comm.size());
            let mut pc = electrons(&layouts, BoundaryPolicy::Absorb, comm.rank(), comm.size());
            if comm.rank() == 0 {
                pc.add_local(0, 0, Particle::new([6.0, 1.0, 1.0], [0.0; 3], 1.0, 5)).unwrap();
                pc.add_local(0, 0, Particle::new([1.0, 1.0, 1.0], [0.0; 3], 1.0, 6)).unwrap();
            }
            let stats = pc.redistribute(RedistributeMode::Full, comm).unwrap();
            let ids: Vec<u64> = pc.iter().map(|p| p.id).collect();
            (stats, ids)
        });
        assert_eq!(results[0].0.sent, 1);
        assert_eq!(results[0].0.kept, 1);
        assert_eq!(results[0].1, vec![6]);
        assert_eq!(results[1].0.received, 1);
        assert_eq!(results[1].1, vec![5]);
    }

    #[test]
    fn layout_change_requires_full_redistribution() {
        let layouts = layouts([true; 3], 1);
        let mut pc = electrons(&layouts, BoundaryPolicy::Absorb, 0, 1);
        pc.inject_uniform(&thermal_profile(), 5).unwrap();
        let n = pc.num_local();

        let domain = layouts[0].geom.domain;
        pc.set_box_array(0, BoxArray::chopped(&domain, 2)).unwrap();
        assert_eq!(pc.num_local(), n);
        assert!(pc.redistribute(RedistributeMode::Local { num_ghost: 1 }, &SerialComm).is_err());

        pc.redistribute(RedistributeMode::Full, &SerialComm).unwrap();
        assert_eq!(pc.num_local(), n);
        assert_eq!(pc.counts(0).unwrap().len(), 16);
        assert_eq!(pc.counts(0).unwrap().iter().sum::<i64>(), n as i64);
    }

    #[test]
    fn distribution_map_must_match_box_count() {
        let layouts = layouts([true; 3], 1);
        let mut pc = electrons(&layouts, BoundaryPolicy::Absorb, 0, 1);
        let dm = DistributionMap::round_robin(3, 1);
        assert!(pc.set_distribution_map(0, dm).is_err());
        assert!(pc.layout(1).is_err());
    }
}
