//! Server-side functions, the profile change trigger, and role grants.

use super::SqlFunction;

pub const PROFILE_CHANNEL: &str = "profile_changes";

/// SQLSTATE raised by `book_slot` when the slot was not `available`.
pub const SLOT_UNAVAILABLE_CODE: &str = "NB409";
/// SQLSTATE raised by `set_booking_status` for a disallowed transition.
pub const INVALID_TRANSITION_CODE: &str = "NB422";

const BOOK_SLOT: &str = r#"CREATE OR REPLACE FUNCTION public.book_slot(p_slot_id uuid, p_service_id text, p_notes text)
RETURNS public.bookings
LANGUAGE plpgsql
SECURITY DEFINER
SET search_path = public
AS $$
DECLARE
    v_caller uuid := auth.uid();
    v_nurse uuid;
    v_booking public.bookings;
BEGIN
    IF v_caller IS NULL OR NOT EXISTS (
        SELECT 1 FROM public.profiles WHERE id = v_caller AND role = 'patient'
    ) THEN
        RAISE EXCEPTION 'only patients can book slots' USING ERRCODE = '42501';
    END IF;

    -- Compare-and-swap: concurrent callers serialize on the row lock and
    -- the loser re-reads a non-available status.
    UPDATE public.nurse_slots
       SET status = 'booked'
     WHERE id = p_slot_id AND status = 'available'
    RETURNING nurse_id INTO v_nurse;

    IF v_nurse IS NULL THEN
        RAISE EXCEPTION 'slot % is not available', p_slot_id USING ERRCODE = 'NB409';
    END IF;

    INSERT INTO public.bookings (patient_id, nurse_id, slot_id, service_id, notes)
    VALUES (v_caller, v_nurse, p_slot_id, p_service_id, p_notes)
    RETURNING * INTO v_booking;

    RETURN v_booking;
END;
$$"#;

const SET_BOOKING_STATUS: &str = r#"CREATE OR REPLACE FUNCTION public.set_booking_status(p_booking_id uuid, p_status public.booking_status)
RETURNS public.bookings
LANGUAGE plpgsql
SECURITY DEFINER
SET search_path = public
AS $$
DECLARE
    v_caller uuid := auth.uid();
    v_booking public.bookings;
BEGIN
    SELECT * INTO v_booking FROM public.bookings WHERE id = p_booking_id FOR UPDATE;

    -- Non-parties get the same answer as a missing row.
    IF NOT FOUND OR v_caller IS NULL OR v_caller NOT IN (v_booking.patient_id, v_booking.nurse_id) THEN
        RAISE EXCEPTION 'booking % not found', p_booking_id USING ERRCODE = 'P0002';
    END IF;

    IF NOT (
        (v_booking.status = 'pending' AND p_status IN ('confirmed', 'cancelled'))
        OR (v_booking.status = 'confirmed' AND p_status IN ('completed', 'cancelled'))
    ) THEN
        RAISE EXCEPTION 'booking cannot move from % to %', v_booking.status, p_status USING ERRCODE = 'NB422';
    END IF;

    IF p_status IN ('confirmed', 'completed') AND v_caller <> v_booking.nurse_id THEN
        RAISE EXCEPTION 'only the nurse can mark a booking %', p_status USING ERRCODE = '42501';
    END IF;

    UPDATE public.bookings
       SET status = p_status, updated_at = now()
     WHERE id = p_booking_id
    RETURNING * INTO v_booking;

    IF p_status = 'cancelled' THEN
        UPDATE public.nurse_slots SET status = 'available' WHERE id = v_booking.slot_id;
    ELSIF p_status = 'completed' THEN
        UPDATE public.nurse_slots SET status = 'completed' WHERE id = v_booking.slot_id;
    END IF;

    RETURN v_booking;
END;
$$"#;

const PROFILE_COUNTS: &str = r#"CREATE OR REPLACE FUNCTION public.profile_counts()
RETURNS TABLE (role public.user_role, total bigint)
LANGUAGE sql
STABLE
SECURITY DEFINER
SET search_path = public
AS $$
    SELECT p.role, count(*) FROM public.profiles p GROUP BY p.role
$$"#;

const NOTIFY_PROFILE_CHANGE: &str = r#"CREATE OR REPLACE FUNCTION public.notify_profile_change()
RETURNS trigger
LANGUAGE plpgsql
AS $$
DECLARE
    v_role public.user_role;
BEGIN
    IF TG_OP = 'DELETE' THEN
        v_role := OLD.role;
    ELSE
        v_role := NEW.role;
    END IF;
    PERFORM pg_notify('profile_changes', json_build_object('op', TG_OP, 'role', v_role)::text);
    RETURN NULL;
END;
$$"#;

pub fn all() -> Vec<SqlFunction> {
    vec![
        SqlFunction { signature: "public.book_slot(uuid, text, text)", definition: BOOK_SLOT },
        SqlFunction {
            signature: "public.set_booking_status(uuid, public.booking_status)",
            definition: SET_BOOKING_STATUS,
        },
        SqlFunction { signature: "public.profile_counts()", definition: PROFILE_COUNTS },
        SqlFunction { signature: "public.notify_profile_change()", definition: NOTIFY_PROFILE_CHANGE },
    ]
}

pub fn triggers() -> Vec<&'static str> {
    vec![
        "CREATE TRIGGER profiles_notify AFTER INSERT OR DELETE OR UPDATE OF role ON public.profiles \
         FOR EACH ROW EXECUTE FUNCTION public.notify_profile_change()",
    ]
}

/// Table privileges for the client roles. Both roles can read every table
/// so that policies, not missing privileges, decide what comes back.
/// Booking status and the slot flip are only reachable through the
/// definer functions; `service_areas` gets no write grant at all.
pub fn grants() -> Vec<&'static str> {
    vec![
        "GRANT SELECT ON public.profiles, public.service_areas, public.patient_profiles, public.nurse_profiles, \
         public.nurse_service_areas, public.nurse_slots, public.bookings TO anon, authenticated",
        "GRANT INSERT ON public.profiles, public.patient_profiles, public.nurse_profiles TO authenticated",
        "GRANT UPDATE (full_name, phone, address, updated_at) ON public.profiles TO authenticated",
        "GRANT UPDATE ON public.patient_profiles, public.nurse_profiles TO authenticated",
        "GRANT INSERT, UPDATE, DELETE ON public.nurse_service_areas, public.nurse_slots TO authenticated",
        "GRANT UPDATE (notes, updated_at) ON public.bookings TO authenticated",
        "REVOKE EXECUTE ON FUNCTION public.book_slot(uuid, text, text), \
         public.set_booking_status(uuid, public.booking_status) FROM PUBLIC",
        "GRANT EXECUTE ON FUNCTION public.book_slot(uuid, text, text), \
         public.set_booking_status(uuid, public.booking_status) TO authenticated",
        "GRANT EXECUTE ON FUNCTION public.profile_counts() TO anon, authenticated",
    ]
}
