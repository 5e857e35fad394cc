//! Driver integration tests over RAM-backed register blocks.
//!
//! Each test binds a driver to a plain memory buffer shaped like the
//! peripheral's register file. Status bits that real hardware would
//! raise are poked into the buffer directly.

use cinder_hal::{cordic, crs, dcache, gfxtim, gpio, spi, tick, Error, TIMEOUT_FOREVER};

fn poke(base: usize, offset: usize, value: u32) {
    unsafe { cinder_ll::mmio::write_reg(base + offset, value) };
}

mod gpio_flow {
    use super::*;
    use cinder_hal::gpio::{PinConfig, PinState, Pins, Port};

    fn ram_port() -> (Box<[u32; 13]>, Port) {
        let ram = Box::new([0u32; 13]);
        let port = Port::new(unsafe { cinder_ll::gpio::GpioBlock::from_base(ram.as_ptr() as usize) });
        (ram, port)
    }

    /// Applies a BSRR word to the ODR the way the port hardware does on
    /// the next clock: resets win over sets in the same write.
    fn propagate_bsrr(ram: &[u32]) {
        let base = ram.as_ptr() as usize;
        let bsrr = ram[0x18 / 4];
        let odr = ram[0x14 / 4];
        let set = bsrr & 0xFFFF;
        let reset = bsrr >> 16;
        poke(base, 0x14, (odr | set) & !reset);
        poke(base, 0x18, 0);
    }

    #[test]
    fn test_output_set_then_read_back() {
        let (ram, port) = ram_port();
        port.init(Pins::PIN_7, &PinConfig::output());
        port.write_pin(7, PinState::High);
        propagate_bsrr(&*ram);
        // input mirrors output in the RAM model once IDR is synced
        poke(ram.as_ptr() as usize, 0x10, ram[0x14 / 4]);
        assert_eq!(port.read_pin(7), PinState::High);
    }

    #[test]
    fn test_double_toggle_is_identity() {
        let (ram, port) = ram_port();
        port.init(Pins::PIN_3, &PinConfig::output());
        port.write_pin(3, PinState::High);
        propagate_bsrr(&*ram);
        let before = ram[0x14 / 4];
        port.toggle(Pins::PIN_3);
        propagate_bsrr(&*ram);
        port.toggle(Pins::PIN_3);
        propagate_bsrr(&*ram);
        assert_eq!(ram[0x14 / 4], before);
    }

    #[test]
    fn test_write_multiple_state_single_word() {
        let (ram, port) = ram_port();
        port.init(Pins::PIN_0 | Pins::PIN_1, &PinConfig::output());
        port.write_pin(0, PinState::High);
        propagate_bsrr(&*ram);
        // one write: pin 0 low, pin 1 high
        port.write_multiple_state(Pins::PIN_0, Pins::PIN_1).unwrap();
        propagate_bsrr(&*ram);
        assert_eq!(ram[0x14 / 4] & 0b11, 0b10);
    }

    #[test]
    fn test_lock_sequence_latches_selection() {
        let (ram, port) = ram_port();
        port.init(Pins::PIN_5, &PinConfig::output());
        // the final key write of the sequence stays latched in the RAM
        // model, which is exactly what a successful lock reads back
        assert!(port.lock(Pins::PIN_5).is_ok());
        assert_eq!(ram[0x1C / 4] & 0xFFFF, Pins::PIN_5.bits());
        assert_ne!(ram[0x1C / 4] & (1 << 16), 0);
    }
}

mod spi_flow {
    use super::*;
    use cinder_ll::spi::SpiFlags;
    use cinder_hal::spi::{Spi, SpiConfig, State};

    const SR: usize = 0x14;

    fn ram_spi() -> (Box<[u32; 0x20]>, Spi) {
        let ram = Box::new([0u32; 0x20]);
        let s = Spi::new(unsafe { cinder_ll::spi::SpiBlock::from_base(ram.as_ptr() as usize) });
        (ram, s)
    }

    #[test]
    fn test_bring_up_and_transmit() {
        let (ram, mut s) = ram_spi();
        s.init().unwrap();
        s.set_config(&SpiConfig::default()).unwrap();
        poke(
            ram.as_ptr() as usize,
            SR,
            (SpiFlags::TXP | SpiFlags::EOT).bits(),
        );
        s.transmit(&[0x9F], TIMEOUT_FOREVER).unwrap();
        assert_eq!(s.state(), State::Idle);
        assert_eq!(ram[0x20 / 4] & 0xFF, 0x9F);
    }

    #[test]
    fn test_transmit_receive_full_duplex() {
        let (ram, mut s) = ram_spi();
        s.init().unwrap();
        s.set_config(&SpiConfig::default()).unwrap();
        poke(
            ram.as_ptr() as usize,
            SR,
            (SpiFlags::TXP | SpiFlags::RXP | SpiFlags::EOT).bits(),
        );
        poke(ram.as_ptr() as usize, 0x30, 0xA5);
        let mut rx = [0u8; 2];
        s.transmit_receive(&[1, 2], &mut rx, TIMEOUT_FOREVER).unwrap();
        // every pop of the RAM RXDR yields the same byte
        assert_eq!(rx, [0xA5, 0xA5]);
    }

    #[test]
    fn test_embedded_hal_bus_write() {
        use embedded_hal::spi::SpiBus;

        let (ram, mut s) = ram_spi();
        s.init().unwrap();
        s.set_config(&SpiConfig::default()).unwrap();
        poke(
            ram.as_ptr() as usize,
            SR,
            (SpiFlags::TXP | SpiFlags::EOT).bits(),
        );
        SpiBus::write(&mut s, &[0x01, 0x02]).unwrap();
        SpiBus::flush(&mut s).unwrap();
        assert_eq!(s.state(), State::Idle);
    }

    #[test]
    fn test_hardware_error_surfaces_after_transfer() {
        let (ram, mut s) = ram_spi();
        s.init().unwrap();
        s.set_config(&SpiConfig::default()).unwrap();
        poke(
            ram.as_ptr() as usize,
            SR,
            (SpiFlags::TXP | SpiFlags::EOT | SpiFlags::MODF).bits(),
        );
        assert_eq!(s.transmit(&[0], TIMEOUT_FOREVER), Err(Error::Hardware));
        assert_eq!(s.state(), State::Fault);
        #[cfg(feature = "get-last-errors")]
        assert!(s.last_errors().contains(spi::SpiError::MODE_FAULT));
    }
}

mod timeout_semantics {
    use super::*;

    // A zero timeout means one failed poll returns immediately, on
    // every driver alike.

    #[test]
    fn test_zero_timeout_is_uniform() {
        let spi_ram = Box::new([0u32; 0x20]);
        let mut s = spi::Spi::new(unsafe {
            cinder_ll::spi::SpiBlock::from_base(spi_ram.as_ptr() as usize)
        });
        s.init().unwrap();
        s.set_config(&spi::SpiConfig::default()).unwrap();
        assert_eq!(s.transmit(&[0], 0), Err(Error::Timeout));

        let crs_ram = Box::new([0u32; 4]);
        let mut c =
            crs::Crs::new(unsafe { cinder_ll::crs::CrsBlock::from_base(crs_ram.as_ptr() as usize) });
        c.init().unwrap();
        c.set_config(&crs::CrsConfig::default()).unwrap();
        c.start_sync().unwrap();
        assert_eq!(c.poll_for_sync(0), Err(Error::Timeout));

        let dc_ram = Box::new([0u32; 10]);
        let mut d = dcache::Dcache::new(unsafe {
            cinder_ll::dcache::DcacheBlock::from_base(dc_ram.as_ptr() as usize)
        });
        d.init().unwrap();
        assert_eq!(d.invalidate_all(0), Err(Error::Timeout));
    }

    #[test]
    fn test_finite_timeout_expires_with_tick() {
        let ram = Box::new([0u32; 10]);
        let mut d = dcache::Dcache::new(unsafe {
            cinder_ll::dcache::DcacheBlock::from_base(ram.as_ptr() as usize)
        });
        d.init().unwrap();

        // expire the deadline from another thread while the driver
        // spins
        let handle = std::thread::spawn(|| {
            std::thread::sleep(std::time::Duration::from_millis(10));
            tick::advance(100);
        });
        assert_eq!(d.invalidate_all(50), Err(Error::Timeout));
        handle.join().unwrap();
    }
}

mod cordic_flow {
    use super::*;
    use cinder_hal::cordic::{Cordic, CordicConfig, Count, Function, Precision};

    #[test]
    fn test_pipeline_of_calculations() {
        let ram = Box::new([0u32; 3]);
        let base = ram.as_ptr() as usize;
        let mut c =
            Cordic::new(unsafe { cinder_ll::cordic::CordicBlock::from_base(base) });
        c.init().unwrap();
        c.set_config(&CordicConfig {
            function: Function::Cosine,
            precision: Precision::Iters24,
            arg_count: Count::One,
            result_count: Count::Two,
            ..CordicConfig::default()
        })
        .unwrap();

        // raise RRDY on top of the configured CSR and park a result
        let csr = unsafe { cinder_ll::mmio::read_reg(base) };
        poke(base, 0, csr | (1 << 31));
        poke(base, 8, 0x7FFF_0000);

        let mut results = [0u32; 4];
        c.calculate(&[0x1000, 0x2000], &mut results, 2, TIMEOUT_FOREVER)
            .unwrap();
        assert!(results.iter().all(|&r| r == 0x7FFF_0000));
    }
}

mod gfxtim_flow {
    use super::*;
    use cinder_hal::gfxtim::{
        ClockConfig, EventGenerator, FrameClockSource, FrameEvent, Gfxtim, LineClockSource,
        LineEvent,
    };

    #[test]
    fn test_display_refresh_setup() {
        let ram = Box::new([0u32; 0x20]);
        let mut g = Gfxtim::new(unsafe {
            cinder_ll::gfxtim::GfxtimBlock::from_base(ram.as_ptr() as usize)
        });
        g.init().unwrap();
        // 60 Hz panel: line clock from the counter, frame every 480
        // lines
        g.set_clock_config(&ClockConfig {
            line_reload: 3332,
            frame_reload: 479,
            line_source: LineClockSource::CounterUnderflow,
            frame_source: FrameClockSource::CounterUnderflow,
        })
        .unwrap();
        g.set_event_config(
            EventGenerator::Event1,
            LineEvent::AlcCompare1,
            FrameEvent::AfcOverflow,
        )
        .unwrap();
        g.start_event_generator(EventGenerator::Event1).unwrap();
        g.start_absolute_timer().unwrap();
        assert_eq!(
            g.event_generator_state(EventGenerator::Event1),
            gfxtim::SubState::Running
        );
    }
}

mod lifecycle {
    use super::*;

    // Reconfiguration recovers a faulted driver without a full deinit.
    #[test]
    fn test_fault_recovery_via_set_config() {
        let ram = Box::new([0u32; 0x20]);
        let base = ram.as_ptr() as usize;
        let mut s =
            spi::Spi::new(unsafe { cinder_ll::spi::SpiBlock::from_base(base) });
        s.init().unwrap();
        s.set_config(&spi::SpiConfig::default()).unwrap();

        poke(
            base,
            0x14,
            (cinder_ll::spi::SpiFlags::TXP
                | cinder_ll::spi::SpiFlags::EOT
                | cinder_ll::spi::SpiFlags::OVR)
                .bits(),
        );
        assert_eq!(s.transmit(&[0], 0), Err(Error::Hardware));
        assert_eq!(s.state(), spi::State::Fault);

        poke(base, 0x14, 0);
        s.set_config(&spi::SpiConfig::default()).unwrap();
        assert_eq!(s.state(), spi::State::Idle);
    }

    #[test]
    fn test_deinit_from_any_state() {
        let ram = Box::new([0u32; 4]);
        let mut c = crs::Crs::new(unsafe {
            cinder_ll::crs::CrsBlock::from_base(ram.as_ptr() as usize)
        });
        c.deinit();
        assert_eq!(c.state(), crs::State::Reset);
        c.init().unwrap();
        c.set_config(&crs::CrsConfig::default()).unwrap();
        c.start_sync().unwrap();
        c.deinit();
        assert_eq!(c.state(), crs::State::Reset);
    }
}
