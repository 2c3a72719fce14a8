// Behavior of the three species variants driven directly

use super::*;
use crate::config::{InjectionProfile, LaserParams, MeshConfig, SpeciesParams};
use crate::mesh::{build_levels, LevelLayout};
use crate::parallel::SerialComm;
use crate::units::{ELECTRON_MASS, ELEMENTARY_CHARGE, SPEED_OF_LIGHT};
use approx::assert_relative_eq;

const DT: f64 = 1.0e-10;

fn layouts() -> Vec<LevelLayout> {
    let mesh = MeshConfig {
        n_cell: [8, 4, 4],
        max_grid_size: 4,
        prob_lo: [0.0; 3],
        prob_hi: [8.0, 4.0, 4.0],
        periodic: [true; 3],
        ngrow: 1,
        refined_regions: Vec::new(),
    };
    build_levels(&mesh, 1).unwrap()
}

fn uniform(layout: &LevelLayout, value: [f64; 3]) -> MeshField {
    let mut mf = MeshField::new(&layout.ba, &layout.dm, 3, 1, 0);
    for (_, fab) in mf.fabs_mut() {
        let grown = *fab.grown_box();
        for cell in grown.cells() {
            for (comp, v) in value.iter().enumerate() {
                fab.set_at(cell, comp, *v);
            }
        }
    }
    mf
}

fn scalar(layout: &LevelLayout) -> MeshField {
    MeshField::new(&layout.ba, &layout.dm, 1, 1, 0)
}

fn plasma(zinject_plane: f64) -> SpeciesParams {
    SpeciesParams {
        profile: InjectionProfile { density: 1.0e3, ppc: [1, 1, 2], ..Default::default() },
        zinject_plane,
        ..Default::default()
    }
}

fn laser_params() -> LaserParams {
    LaserParams {
        position: [4.0, 2.0, 1.5],
        direction: 2,
        polarization: [2.0, 0.0, 0.0],
        e_max: 1.0e9,
        wavelength: 4.0,
        waist: 10.0,
        duration: 1.0e-7,
        t_peak: 0.0,
    }
}

/// A quarter period after the envelope peak, where the antenna drive is maximal.
fn quarter_period() -> f64 {
    0.25 * laser_params().wavelength / SPEED_OF_LIGHT
}

#[cfg(test)]
mod physical {
    use super::*;

    fn electrons(layouts: &[LevelLayout]) -> PhysicalSpecies {
        let desc = SpeciesDescriptor::new("electrons", SpeciesKind::Physical, 0);
        let mut s = PhysicalSpecies::new(desc, plasma(0.0), 11, layouts, &SerialComm);
        s.alloc_data();
        s
    }

    #[test]
    fn init_data_fills_the_domain() {
        let layouts = layouts();
        let mut s = electrons(&layouts);
        assert_eq!(s.init_data(&SerialComm).unwrap(), 8 * 4 * 4 * 2);
        assert_relative_eq!(s.sum_charge_local(), -ELEMENTARY_CHARGE * 1.0e3 * 128.0, epsilon = 1e-30, max_relative = 1e-12);
    }

    #[test]
    fn deposit_charge_zeroes_before_depositing() {
        let layouts = layouts();
        let mut s = electrons(&layouts);
        s.init_data(&SerialComm).unwrap();
        let mut rho = vec![scalar(&layouts[0])];
        rho[0].set_val(123.0, 1);
        s.deposit_charge(&mut rho, false, &SerialComm).unwrap();
        let total = rho[0].sum_valid(0, &SerialComm).unwrap() * layouts[0].geom.cell_volume();
        assert_relative_eq!(total, s.sum_charge_local(), epsilon = 1e-30, max_relative = 1e-12);

        let fresh = s.get_charge_density(0, 1, false, &SerialComm).unwrap();
        assert_eq!(fresh, rho[0]);
    }

    #[test]
    fn electrostatic_evolve_accelerates_and_deposits() {
        let layouts = layouts();
        let mut s = electrons(&layouts);
        s.init_data(&SerialComm).unwrap();
        let e = vec![uniform(&layouts[0], [0.0, 0.0, 1.0e3])];
        let mut rho = vec![scalar(&layouts[0])];
        s.evolve_es(&e, &mut rho, 0.0, DT).unwrap();

        let expected = -ELEMENTARY_CHARGE * 1.0e3 * DT / ELECTRON_MASS;
        for p in s.container().iter() {
            assert_relative_eq!(p.mom[2], expected, max_relative = 1e-9);
            assert_eq!(p.mom[0], 0.0);
        }
        assert!(rho[0].fabs().any(|(_, f)| f.sum_valid(0) != 0.0));
    }

    #[test]
    fn evolve_fills_rho_before_and_after_the_push() {
        let layouts = layouts();
        let mut s = electrons(&layouts);
        s.init_data(&SerialComm).unwrap();
        let e = uniform(&layouts[0], [1.0e3, 0.0, 0.0]);
        let b = uniform(&layouts[0], [0.0; 3]);
        let mut j = uniform(&layouts[0], [0.0; 3]);
        let mut rho = scalar(&layouts[0]);
        let mut rho2 = scalar(&layouts[0]);
        let mut targets = CurrentTargets { j: &mut j, rho: Some(&mut rho), rho2: Some(&mut rho2) };
        s.evolve(0, EmFields { e: &e, b: &b }, &mut targets, 0.0, DT).unwrap();

        let geom = &layouts[0].geom;
        for field in [&mut rho, &mut rho2] {
            field.sum_boundary(geom, &SerialComm).unwrap();
            let total = field.sum_valid(0, &SerialComm).unwrap() * geom.cell_volume();
            assert_relative_eq!(total, s.sum_charge_local(), epsilon = 1e-30, max_relative = 1e-12);
        }
        j.sum_boundary(geom, &SerialComm).unwrap();
        assert!(j.sum_valid(0, &SerialComm).unwrap() > 0.0);
        assert_eq!(j.sum_valid(1, &SerialComm).unwrap(), 0.0);
    }

    #[test]
    fn push_p_leaves_positions_alone() {
        let layouts = layouts();
        let mut s = electrons(&layouts);
        s.init_data(&SerialComm).unwrap();
        let before: Vec<_> = s.container().iter().map(|p| p.pos).collect();
        let e = uniform(&layouts[0], [0.0, 5.0e2, 0.0]);
        let b = uniform(&layouts[0], [0.0; 3]);
        s.push_p(0, DT, EmFields { e: &e, b: &b }).unwrap();
        let after: Vec<_> = s.container().iter().map(|p| p.pos).collect();
        assert_eq!(before, after);
        assert!(s.container().iter().all(|p| p.mom[1] < 0.0));
    }
}

#[cfg(test)]
mod rigid_injected {
    use super::*;

    fn beam(layouts: &[LevelLayout], plane: f64) -> RigidInjectedSpecies {
        let desc = SpeciesDescriptor::new("beam", SpeciesKind::RigidInjected, 1);
        let mut s = RigidInjectedSpecies::new(desc, plasma(plane), 11, 2, layouts, &SerialComm);
        s.alloc_data();
        s
    }

    #[test]
    fn upstream_particles_coast() {
        let layouts = layouts();
        let mut s = beam(&layouts, 2.0);
        s.init_data(&SerialComm).unwrap();
        assert!(!s.done_injecting());

        let e = uniform(&layouts[0], [1.0e3, 0.0, 0.0]);
        let b = uniform(&layouts[0], [0.0; 3]);
        let mut j = uniform(&layouts[0], [0.0; 3]);
        let mut targets = CurrentTargets::current_only(&mut j);
        s.evolve(0, EmFields { e: &e, b: &b }, &mut targets, 0.0, DT).unwrap();

        for p in s.container().iter() {
            if p.prev_pos[2] < 2.0 {
                assert_eq!(p.mom, [0.0; 3]);
            } else {
                assert!(p.mom[0] < 0.0);
            }
        }
    }

    #[test]
    fn plane_at_the_domain_edge_is_crossed_from_the_start() {
        let layouts = layouts();
        let mut s = beam(&layouts, 0.0);
        s.init_data(&SerialComm).unwrap();
        assert!(s.done_injecting());
        assert_eq!(s.zinject_plane(), 0.0);
    }

    #[test]
    fn post_restart_recomputes_injection_state() {
        let layouts = layouts();
        let mut s = beam(&layouts, 2.0);
        s.container_mut()
            .add_local(0, 0, crate::particles::Particle::new([1.0, 1.0, 3.0], [0.0; 3], 1.0, 1))
            .unwrap();
        assert!(!s.done_injecting());
        s.post_restart();
        assert!(s.done_injecting());
    }
}

#[cfg(test)]
mod laser {
    use super::*;

    fn antenna(layouts: &[LevelLayout], params: LaserParams) -> PicResult<LaserSpecies> {
        let desc = SpeciesDescriptor::new(LASER_SPECIES_NAME, SpeciesKind::Laser, 0);
        LaserSpecies::new(desc, params, layouts, &SerialComm)
    }

    #[test]
    fn one_particle_per_plane_cell() {
        let layouts = layouts();
        let mut s = antenna(&layouts, laser_params()).unwrap();
        s.alloc_data();
        assert_eq!(s.init_data(&SerialComm).unwrap(), 8 * 4);
        assert!(s.container().iter().all(|p| p.pos[2] == 1.5));
    }

    #[test]
    fn antenna_carries_no_charge() {
        let layouts = layouts();
        let mut s = antenna(&layouts, laser_params()).unwrap();
        s.init_data(&SerialComm).unwrap();
        assert!(s.container().sum_charge() != 0.0);
        assert_eq!(s.sum_charge_local(), 0.0);
        let rho = s.get_charge_density(0, 1, false, &SerialComm).unwrap();
        assert_eq!(rho.sum_valid(0, &SerialComm).unwrap(), 0.0);
    }

    #[test]
    fn current_follows_the_polarization() {
        let layouts = layouts();
        let mut s = antenna(&layouts, laser_params()).unwrap();
        s.init_data(&SerialComm).unwrap();
        let e = uniform(&layouts[0], [0.0; 3]);
        let b = uniform(&layouts[0], [0.0; 3]);
        let mut j = uniform(&layouts[0], [0.0; 3]);
        let mut targets = CurrentTargets::current_only(&mut j);
        s.evolve(0, EmFields { e: &e, b: &b }, &mut targets, quarter_period(), DT).unwrap();

        j.sum_boundary(&layouts[0].geom, &SerialComm).unwrap();
        assert!(j.sum_valid(0, &SerialComm).unwrap().abs() > 0.0);
        assert_eq!(j.sum_valid(1, &SerialComm).unwrap(), 0.0);
        assert_eq!(j.sum_valid(2, &SerialComm).unwrap(), 0.0);
        for p in s.container().iter() {
            assert!(p.mom[0].abs() / SPEED_OF_LIGHT <= 0.011);
        }
    }

    #[test]
    fn plane_outside_the_domain_creates_nothing() {
        let layouts = layouts();
        let params = LaserParams { position: [0.0, 0.0, 9.0], ..laser_params() };
        let mut s = antenna(&layouts, params).unwrap();
        assert_eq!(s.init_data(&SerialComm).unwrap(), 0);
    }

    #[test]
    fn invalid_antennas_are_rejected() {
        let layouts = layouts();
        let along_normal = LaserParams { polarization: [0.0, 0.0, 1.0], ..laser_params() };
        assert!(antenna(&layouts, along_normal).is_err());
        let no_wavelength = LaserParams { wavelength: 0.0, ..laser_params() };
        assert!(antenna(&layouts, no_wavelength).is_err());
        let bad_axis = LaserParams { direction: 3, ..laser_params() };
        assert!(antenna(&layouts, bad_axis).is_err());
    }
}
