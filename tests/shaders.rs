//! WGSL kernels parse, validate and agree with the Rust-side kernel signatures.

use naga::front::wgsl;
use naga::valid::{Capabilities, ValidationFlags, Validator};

use wavefield::backend::{kernel_wgsl, Kernel, TextureFormat};

fn parse(kernel: Kernel) -> (naga::Module, &'static str) {
    let (source, entry_point) = kernel_wgsl(kernel);
    let module = wgsl::parse_str(&source)
        .unwrap_or_else(|err| panic!("{:?}: {}", kernel, err.emit_to_string(&source)));
    (module, entry_point)
}

fn storage_format(format: TextureFormat) -> naga::StorageFormat {
    match format {
        TextureFormat::R32Float => naga::StorageFormat::R32Float,
        TextureFormat::Rgba32Float => naga::StorageFormat::Rgba32Float,
    }
}

#[test]
fn test_kernels_validate() {
    for kernel in Kernel::ALL {
        let (module, _) = parse(kernel);
        Validator::new(ValidationFlags::all(), Capabilities::empty())
            .validate(&module)
            .unwrap_or_else(|err| panic!("{:?} failed validation: {:?}", kernel, err));
    }
}

#[test]
fn test_entry_points_use_8x8_workgroups() {
    for kernel in Kernel::ALL {
        let (module, entry_point) = parse(kernel);
        let entry = module
            .entry_points
            .iter()
            .find(|ep| ep.name == entry_point)
            .unwrap_or_else(|| panic!("{:?}: no entry point {}", kernel, entry_point));
        assert_eq!(entry.stage, naga::ShaderStage::Compute);
        assert_eq!(entry.workgroup_size, [8, 8, 1], "{:?}", kernel);
    }
}

#[test]
fn test_bindings_match_kernel_signatures() {
    for kernel in Kernel::ALL {
        let (module, _) = parse(kernel);
        let (reads, writes) = kernel.signature();

        let mut bindings: Vec<u32> = module
            .global_variables
            .iter()
            .filter_map(|(_, var)| var.binding.as_ref())
            .inspect(|binding| assert_eq!(binding.group, 0))
            .map(|binding| binding.binding)
            .collect();
        bindings.sort_unstable();
        let expected: Vec<u32> = (0..(reads.len() + writes.len() + 1) as u32).collect();
        assert_eq!(bindings, expected, "{:?}", kernel);

        // Write slots follow the reads and carry the signature's storage format
        for (_, var) in module.global_variables.iter() {
            let Some(binding) = var.binding.as_ref() else {
                continue;
            };
            let slot = binding.binding as usize;
            match &module.types[var.ty].inner {
                naga::TypeInner::Image {
                    class: naga::ImageClass::Storage { format, .. },
                    ..
                } => {
                    assert!(slot >= reads.len() && slot < reads.len() + writes.len(), "{:?}", kernel);
                    assert_eq!(*format, storage_format(writes[slot - reads.len()]), "{:?}", kernel);
                }
                naga::TypeInner::Image { .. } => assert!(slot < reads.len(), "{:?}", kernel),
                _ => assert_eq!(slot, reads.len() + writes.len(), "{:?}", kernel),
            }
        }
    }
}
